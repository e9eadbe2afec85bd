// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_ENDPOINT: &str = "http://localhost:8765";
const APP_NAME: &str = "tabletalk";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub connection: Connection,
    #[serde(default)]
    pub ui: Ui,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            connection: Connection::default(),
            ui: Ui::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    pub endpoint: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            endpoint: Some(DEFAULT_ENDPOINT.to_owned()),
            timeout: Some("5s".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ui {
    pub page_size: Option<usize>,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            page_size: Some(tabletalk_app::DEFAULT_PAGE_SIZE),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("TABLETALK_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set TABLETALK_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and move values under [connection] and [ui]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(endpoint) = &self.connection.endpoint {
            tabletalk_session::validate_endpoint(endpoint)
                .with_context(|| format!("connection.endpoint in {}", path.display()))?;
        }

        if let Some(page_size) = self.ui.page_size
            && page_size == 0
        {
            bail!(
                "ui.page_size in {} must be positive, got 0",
                path.display()
            );
        }

        if let Some(timeout) = &self.connection.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "connection.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        Ok(())
    }

    pub fn endpoint(&self) -> &str {
        self.connection
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.connection.timeout.as_deref().unwrap_or("5s"))
    }

    pub fn page_size(&self) -> usize {
        self.ui
            .page_size
            .unwrap_or(tabletalk_app::DEFAULT_PAGE_SIZE)
            .max(1)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# tabletalk config\n# Place this file at: {}\n\nversion = 1\n\n[connection]\nendpoint = \"{}\"\ntimeout = \"5s\"\n\n[ui]\npage_size = {}\n",
            path.display(),
            DEFAULT_ENDPOINT,
            tabletalk_app::DEFAULT_PAGE_SIZE,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}
