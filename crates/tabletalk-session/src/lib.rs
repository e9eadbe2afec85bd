// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod http;

use anyhow::{Result, bail};
use serde::Deserialize;
use serde_json::{Map, Value};
use tabletalk_app::{Record, RemoteEvent, ResultSet, Scalar, SchemaColumn, SchemaTable};

pub use http::{HttpChannel, validate_endpoint};

/// What the transport surfaced since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Connected,
    Frame(String),
    Closed(String),
    Idle,
}

/// The message channel to the peer: ordered, reliable, asynchronous text
/// frames plus connect/close signals. Implementations must never block in
/// `poll`.
pub trait Channel {
    fn send(&mut self, frame: &str) -> Result<()>;
    fn poll(&mut self) -> ChannelSignal;
}

/// Outbound command shapes, one JSON document per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    UserInput(String),
    GetSchemaContext,
    SchemaContextUpdate(Vec<String>),
}

impl ClientCommand {
    pub fn to_frame(&self) -> String {
        match self {
            Self::UserInput(text) => serde_json::json!({ "user_input": text }),
            Self::GetSchemaContext => serde_json::json!({ "get_schema_context": true }),
            Self::SchemaContextUpdate(tables) => {
                serde_json::json!({ "schema_context_update": tables })
            }
        }
        .to_string()
    }
}

// Inbound classification is first-match over the untagged variants, so the
// variant order below is the dispatch order: a frame carrying `reply` is a
// chat reply even if other fields ride along.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireFrame {
    Reply {
        reply: String,
        #[serde(default)]
        db_result: Option<Vec<Map<String, Value>>>,
    },
    SchemaContext {
        db_schema_context: WireSchemaContext,
    },
    SelectionConfirmed {
        schema_context_updated: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct WireSchemaContext {
    schema_data: Vec<WireTable>,
    #[serde(default)]
    tables: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireTable {
    table_name: String,
    #[serde(default)]
    columns: Vec<WireColumn>,
}

#[derive(Debug, Deserialize)]
struct WireColumn {
    name: String,
    data_type: String,
}

fn scalar_from_value(value: Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::Bool(flag) => Scalar::Bool(flag),
        Value::Number(number) => Scalar::Number(number.as_f64().unwrap_or(f64::NAN)),
        Value::String(text) => Scalar::Text(text),
        // Structured values are flattened to their JSON text.
        other => Scalar::Text(other.to_string()),
    }
}

fn record_from_object(object: Map<String, Value>) -> Record {
    Record::from_fields(
        object
            .into_iter()
            .map(|(name, value)| (name, scalar_from_value(value)))
            .collect(),
    )
}

fn table_from_wire(table: WireTable) -> SchemaTable {
    SchemaTable {
        name: table.table_name,
        columns: table
            .columns
            .into_iter()
            .map(|column| SchemaColumn {
                name: column.name,
                data_type: column.data_type,
            })
            .collect(),
    }
}

/// The session router: classifies inbound frames, owns the authoritative
/// result set and schema snapshot (single writer), and serializes outbound
/// commands.
///
/// A reply's result-set change is staged rather than applied: the consumer
/// shows the reply text first, then calls [`Session::apply_pending_result`]
/// to promote the staged generation (or clear the table when the reply
/// carried no result).
pub struct Session<C> {
    channel: C,
    result_set: ResultSet,
    pending_result: Option<ResultSet>,
    schema_snapshot: Vec<SchemaTable>,
    schema_selected: Vec<String>,
    closed: bool,
    dropped_frames: usize,
}

impl<C: Channel> Session<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            result_set: ResultSet::default(),
            pending_result: None,
            schema_snapshot: Vec::new(),
            schema_selected: Vec::new(),
            closed: false,
            dropped_frames: 0,
        }
    }

    pub fn result_set(&self) -> &ResultSet {
        &self.result_set
    }

    pub fn schema_snapshot(&self) -> &[SchemaTable] {
        &self.schema_snapshot
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    /// Serialize and send one command. Refused once the channel has closed;
    /// the session is terminal and nothing further goes out.
    pub fn send(&mut self, command: &ClientCommand) -> Result<()> {
        if self.closed {
            bail!("connection closed; restart tabletalk to start a new session");
        }
        self.channel.send(&command.to_frame())
    }

    /// Drain the channel and classify everything it delivered, in order.
    pub fn pump(&mut self) -> Vec<RemoteEvent> {
        let mut events = Vec::new();
        while !self.closed {
            match self.channel.poll() {
                ChannelSignal::Idle => break,
                ChannelSignal::Connected => events.push(RemoteEvent::Connected),
                ChannelSignal::Closed(reason) => {
                    self.closed = true;
                    events.push(RemoteEvent::Closed { reason });
                }
                ChannelSignal::Frame(raw) => {
                    if let Some(event) = self.handle_frame(&raw) {
                        events.push(event);
                    }
                }
            }
        }
        events
    }

    fn handle_frame(&mut self, raw: &str) -> Option<RemoteEvent> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(error) => {
                // Hardened over the reference: a bad frame is dropped and
                // reported, the session keeps going.
                self.dropped_frames += 1;
                return Some(RemoteEvent::FrameDropped {
                    detail: error.to_string(),
                });
            }
        };

        let frame: WireFrame = match serde_json::from_value(value) {
            Ok(frame) => frame,
            // Well-formed but unrecognized shapes are silently ignored.
            Err(_) => return None,
        };

        match frame {
            WireFrame::Reply { reply, db_result } => {
                let carries_result = db_result.is_some();
                let staged = db_result
                    .map(|rows| ResultSet::new(rows.into_iter().map(record_from_object).collect()))
                    .unwrap_or_default();
                self.pending_result = Some(staged);
                Some(RemoteEvent::Reply {
                    text: reply,
                    carries_result,
                })
            }
            WireFrame::SchemaContext { db_schema_context } => {
                self.schema_snapshot = db_schema_context
                    .schema_data
                    .into_iter()
                    .map(table_from_wire)
                    .collect();
                self.schema_selected = db_schema_context.tables;
                Some(RemoteEvent::SchemaSnapshot {
                    tables: self.schema_snapshot.clone(),
                    selected: self.schema_selected.clone(),
                })
            }
            WireFrame::SelectionConfirmed {
                schema_context_updated,
            } => Some(RemoteEvent::SelectionConfirmed {
                tables: schema_context_updated,
            }),
        }
    }

    /// Promote the staged result-set generation, replacing (or clearing) the
    /// current one. Returns false when nothing was staged.
    pub fn apply_pending_result(&mut self) -> bool {
        match self.pending_result.take() {
            Some(next) => {
                self.result_set = next;
                true
            }
            None => false,
        }
    }
}
