//! Probe Configuration
//!
//! Settings come from a TOML file (explicit `--config`, else
//! `<config dir>/statuslink/probe.toml` when present) and are then overridden
//! by command-line flags. The `[core]` table is the sync core's own
//! [`StatusLinkConfig`], so the probe exercises the same tunables a device does.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use statuslink_core::protocol::topics;
use statuslink_core::{
    ChannelSpec, Endpoint, JoinConfig, PostgresChangeFilter, StatusLinkConfig,
};

use crate::cli::{Cli, ProbeMode};
use crate::error::{CliError, Result};

const CONFIG_DIR: &str = "statuslink";
const CONFIG_FILE: &str = "probe.toml";

// ----------------------------------------------------------------------------
// Configuration Types
// ----------------------------------------------------------------------------

/// Complete configuration for a probe run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub core: StatusLinkConfig,
    pub probe: ProbeSettings,
}

/// What to connect to and what to listen for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub project_url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
    pub mode: ProbeMode,
    pub topic: String,
    /// Takes precedence over `topic` and `user_id`
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub schema: String,
    pub table: String,
    pub filter: Option<String>,
    /// Main loop period
    pub tick_ms: u64,
    /// Free heap reported to the admission gates
    pub host_heap_bytes: u32,
    /// Zero runs until interrupted
    pub timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            project_url: String::new(),
            anon_key: String::new(),
            access_token: None,
            mode: ProbeMode::Broadcast,
            topic: "probe".to_string(),
            device_id: None,
            user_id: None,
            schema: "public".to_string(),
            table: "commands".to_string(),
            filter: None,
            tick_ms: 50,
            host_heap_bytes: 256 * 1024,
            timeout_secs: 0,
        }
    }
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

impl ProbeConfig {
    /// Load from the explicit path, the default location, or defaults
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        match explicit {
            Some(path) => {
                info!("Loading configuration from: {}", path);
                Self::load_from_file(path)
            }
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    info!("Loading configuration from: {}", path.display());
                    Self::load_from_file(path)
                }
                None => {
                    debug!("Using default configuration");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.core.validate()?;
        Ok(config)
    }

    /// Command-line flags win over the file
    pub fn apply_cli(&mut self, cli: &Cli) {
        let probe = &mut self.probe;
        if let Some(url) = &cli.project_url {
            probe.project_url = url.clone();
        }
        if let Some(key) = &cli.anon_key {
            probe.anon_key = key.clone();
        }
        if let Some(token) = &cli.token {
            probe.access_token = Some(token.clone());
        }
        if let Some(mode) = cli.mode {
            probe.mode = mode;
        }
        if let Some(topic) = &cli.topic {
            probe.topic = topic.clone();
        }
        if let Some(id) = &cli.device_id {
            probe.device_id = Some(id.clone());
        }
        if let Some(id) = &cli.user_id {
            probe.user_id = Some(id.clone());
        }
        if let Some(schema) = &cli.schema {
            probe.schema = schema.clone();
        }
        if let Some(table) = &cli.table {
            probe.table = table.clone();
        }
        if let Some(filter) = &cli.filter {
            probe.filter = Some(filter.clone());
        }
        if let Some(timeout) = cli.timeout {
            probe.timeout_secs = timeout;
        }
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        if self.probe.project_url.is_empty() || self.probe.anon_key.is_empty() {
            return Err(CliError::Config(
                "project_url and anon_key are required".to_string(),
            ));
        }
        Ok(Endpoint::new(&self.probe.project_url, &self.probe.anon_key)?)
    }

    /// The single channel the probe joins
    ///
    /// Device and user channels are private broadcast channels named after
    /// the canonical id.
    pub fn channel(&self) -> Result<ChannelSpec> {
        let probe = &self.probe;
        if let Some(id) = &probe.device_id {
            return Ok(ChannelSpec::new(&topics::device(id)?, JoinConfig::broadcast(true)));
        }
        if let Some(id) = &probe.user_id {
            return Ok(ChannelSpec::new(&topics::user(id)?, JoinConfig::broadcast(true)));
        }
        let join = match probe.mode {
            ProbeMode::Broadcast => JoinConfig::broadcast(probe.access_token.is_some()),
            ProbeMode::Postgres => {
                let mut filter = PostgresChangeFilter::table(&probe.schema, &probe.table);
                if let Some(expr) = &probe.filter {
                    filter = filter.with_filter(expr.clone());
                }
                JoinConfig::postgres(vec![filter])
            }
        };
        Ok(ChannelSpec::new(&probe.topic, join))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
