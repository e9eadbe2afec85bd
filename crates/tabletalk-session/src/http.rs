// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use std::io::{BufRead, BufReader};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;
use url::Url;

use crate::{Channel, ChannelSignal};

/// Message channel over HTTP: one long-lived streaming GET delivers inbound
/// frames as newline-delimited JSON, read on a background thread; outbound
/// commands are individual POSTs. End of the inbound stream (or a read
/// error) closes the session for good.
#[derive(Debug)]
pub struct HttpChannel {
    send_url: String,
    http: HttpClient,
    signals: Receiver<ChannelSignal>,
    closed: bool,
}

impl HttpChannel {
    pub fn connect(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = validate_endpoint(base_url)?;

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        // The subscription reads indefinitely, so it gets its own client
        // with only a connect timeout.
        let subscriber = HttpClient::builder()
            .connect_timeout(timeout)
            .build()
            .context("build subscription client")?;

        let events_url = format!("{base_url}/events");
        let response = subscriber
            .get(&events_url)
            .send()
            .map_err(|error| connection_error(&base_url, error))?;

        let status = response.status();
        if !status.is_success() {
            bail!("server refused subscription ({})", status.as_u16());
        }

        let (tx, rx) = mpsc::channel();
        let _ = tx.send(ChannelSignal::Connected);
        thread::spawn(move || read_frames(response, &tx));

        Ok(Self {
            send_url: format!("{base_url}/messages"),
            http,
            signals: rx,
            closed: false,
        })
    }
}

fn read_frames(response: reqwest::blocking::Response, tx: &Sender<ChannelSignal>) {
    for line in BufReader::new(response).lines() {
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if tx.send(ChannelSignal::Frame(trimmed.to_owned())).is_err() {
                    return;
                }
            }
            Err(error) => {
                let _ = tx.send(ChannelSignal::Closed(format!("read failed: {error}")));
                return;
            }
        }
    }
    let _ = tx.send(ChannelSignal::Closed("server closed the stream".to_owned()));
}

impl Channel for HttpChannel {
    fn send(&mut self, frame: &str) -> Result<()> {
        if self.closed {
            bail!("channel closed");
        }

        let response = self
            .http
            .post(&self.send_url)
            .header("Content-Type", "application/json")
            .body(frame.to_owned())
            .send()
            .map_err(|error| connection_error(&self.send_url, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(send_error(status, &response.text().unwrap_or_default()));
        }
        Ok(())
    }

    fn poll(&mut self) -> ChannelSignal {
        if self.closed {
            return ChannelSignal::Idle;
        }
        match self.signals.try_recv() {
            Ok(signal) => {
                if matches!(signal, ChannelSignal::Closed(_)) {
                    self.closed = true;
                }
                signal
            }
            Err(TryRecvError::Empty) => ChannelSignal::Idle,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                ChannelSignal::Closed("subscription reader stopped".to_owned())
            }
        }
    }
}

/// Check an endpoint URL and return it normalized (no trailing slash).
/// Shared with config validation so `--check` fails before connecting.
pub fn validate_endpoint(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("connection.endpoint must not be empty");
    }

    let parsed = Url::parse(trimmed)
        .with_context(|| format!("connection.endpoint {trimmed:?} is not a valid URL"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_owned()),
        other => bail!("connection.endpoint must be http or https, got {other:?}"),
    }
}

fn connection_error(url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!("cannot reach {url} -- is the tabletalk server running? ({error})")
}

fn send_error(status: StatusCode, body: &str) -> anyhow::Error {
    if body.len() < 100 && !body.contains('{') && !body.is_empty() {
        return anyhow!("server rejected message ({}): {}", status.as_u16(), body);
    }
    anyhow!("server rejected message ({})", status.as_u16())
}
