//! The Discord-facing half of the importer.
//!
//! - [`gateway`] — the [`DiscordGateway`](gateway::DiscordGateway) trait,
//!   wire payload types, and error classification
//! - [`rest`] — the REST implementation of the gateway
//! - [`resolver`] — destination server and channel resolution
//! - [`retry`] — the unbounded retry policy wrapped around every remote
//!   call in the posting path
//! - [`poster`] — the sequential delivery pipeline

pub mod gateway;
pub mod poster;
pub mod resolver;
pub mod rest;
pub mod retry;

pub use gateway::{DiscordGateway, GatewayError};
pub use poster::{DeliveryPipeline, DeliveryReport, PipelineState};
pub use resolver::{validate_channel_name, ChannelResolver, ResolvedChannels};
pub use rest::RestGateway;
pub use retry::RetryPolicy;
