//! blaze-sync: resilient remote-data client for sports-analytics
//! dashboards.
//!
//! Three collaborating pieces: a TTL [`cache`], a retrying and
//! circuit-breaking [`fetch::ResilientFetcher`] with static fallback
//! data, and a reconnecting [`stream::LiveStreamClient`] behind the
//! swappable [`source::DataSource`] seam.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod source;
pub mod stream;
pub mod testing;
pub mod types;

pub use cache::{CacheStats, ResponseCache};
pub use client::SyncClient;
pub use config::Config;
pub use error::{ErrorCategory, Result, SyncError};
pub use fetch::circuit::{CircuitBreaker, CircuitDecision, CircuitState};
pub use fetch::fallback::{default_team_catalog, FallbackTable};
pub use fetch::retry::RetryPolicy;
pub use fetch::{FetchOptions, FetchOutcome, ResilientFetcher};
pub use source::{DataSource, LiveStreamSource, SimulatedConfig, SimulatedSource};
pub use stream::{
    ConnectionStatus, LiveStreamClient, StreamConfig, StreamEvent, StreamMetrics,
};
pub use types::{StreamMessage, Team};
