//! Command-line interface definitions and parsing

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Project reference or host, e.g. `abcd1234` or `abcd1234.supabase.co`
    #[arg(long)]
    pub project_url: Option<String>,

    /// Anonymous API key sent with the socket URL
    #[arg(long)]
    pub anon_key: Option<String>,

    /// User access token for private channels
    #[arg(long)]
    pub token: Option<String>,

    /// What the probe channel subscribes to
    #[arg(short, long, value_enum)]
    pub mode: Option<ProbeMode>,

    /// Channel topic, with or without the `realtime:` prefix
    #[arg(short, long)]
    pub topic: Option<String>,

    /// Join the private channel of this device id instead of `--topic`
    #[arg(long, conflicts_with = "user_id")]
    pub device_id: Option<String>,

    /// Join the private channel of this user id instead of `--topic`
    #[arg(long)]
    pub user_id: Option<String>,

    /// Schema watched in postgres mode
    #[arg(long)]
    pub schema: Option<String>,

    /// Table watched in postgres mode
    #[arg(long)]
    pub table: Option<String>,

    /// Row filter in postgres mode, e.g. `device_id=eq.42`
    #[arg(long)]
    pub filter: Option<String>,

    /// Broadcast this JSON payload once the channel is joined
    #[arg(short, long)]
    pub send: Option<String>,

    /// Stop after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Subscription flavor of the probe channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    #[default]
    Broadcast,
    Postgres,
}
