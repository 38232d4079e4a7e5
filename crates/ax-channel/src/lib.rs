//! C?: the `Channel` adapter contract and [`ChannelManager`] lifecycle.
//! Concrete adapters (Slack, a web widget, …) are out of scope for this repo
//! per spec.md's Non-goals — this crate only defines what they must conform
//! to, using `ax_core`'s `InboundMessage`/`OutboundMessage` shapes so a
//! channel's output needs no translation before it reaches the router (C8).

pub mod channel;
pub mod error;
pub mod manager;
pub mod types;

pub use ax_core::types::{InboundMessage, OutboundMessage};
pub use channel::Channel;
pub use error::ChannelError;
pub use manager::ChannelManager;
pub use types::ChannelStatus;
