//! Application-facing composition root: one fetcher plus one stream
//! client built from a single validated `Config`, ready to hand to
//! widgets by reference.

use crate::config::Config;
use crate::fetch::fallback::FallbackTable;
use crate::fetch::ResilientFetcher;
use crate::stream::{LiveStreamClient, StreamConfig};
use anyhow::{anyhow, Result};
use url::Url;

pub struct SyncClient {
    pub fetcher: ResilientFetcher,
    pub stream: LiveStreamClient,
}

impl SyncClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_fallback(config, FallbackTable::with_defaults())
    }

    pub fn with_fallback(config: &Config, fallback: FallbackTable) -> Result<Self> {
        Url::parse(&config.api_base_url)
            .map_err(|e| anyhow!("invalid API base URL {}: {}", config.api_base_url, e))?;
        let ws = Url::parse(&config.ws_url)
            .map_err(|e| anyhow!("invalid stream URL {}: {}", config.ws_url, e))?;
        if ws.scheme() != "ws" && ws.scheme() != "wss" {
            return Err(anyhow!("stream URL must use ws:// or wss://, got {}", ws.scheme()));
        }

        Ok(Self {
            fetcher: ResilientFetcher::with_fallback(config, fallback),
            stream: LiveStreamClient::new(StreamConfig::from_config(config)),
        })
    }

    /// Build from environment variables (`BLAZE_*`), logging the loaded
    /// configuration.
    pub fn from_env() -> Result<Self> {
        let config = Config::from_env();
        config.validate_and_log();
        Self::new(&config)
    }
}
