//! Realtime wire protocol: envelope codec, channel sessions and message normalization

pub mod endpoint;
pub mod inbound;
pub mod join;
pub mod session;
pub mod wire;

pub use endpoint::Endpoint;
pub use inbound::InboundMessage;
pub use join::{normalize_jwt, topics, ChannelSpec, JoinConfig, PostgresChangeFilter};
pub use session::{ChannelSession, JoinOutcome, RefCounter};
pub use wire::{decode, encode, events, is_join_scoped, Envelope, WireShape, PHOENIX_TOPIC, TOPIC_PREFIX};
