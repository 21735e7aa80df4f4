use std::env;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub ws_url: String,
    /// Platform tag sent in the stream auth payload
    pub platform: String,
    pub cache_default_ttl_ms: u64,
    /// Soft entry limit that triggers a sweep on write
    pub cache_soft_limit: usize,
    /// Hard entry cap enforced by the sweep (oldest-accessed evicted)
    pub cache_max_entries: usize,
    pub cache_sweep_interval_secs: u64,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub failure_threshold: u32,
    pub failure_window_ms: u64,
    pub circuit_open_base_ms: u64,
    pub circuit_open_max_ms: u64,
    pub ws_reconnect_base_delay_ms: u64,
    pub ws_reconnect_cap_exponent: u32,
    pub ws_reconnect_max_delay_ms: u64,
    pub ws_max_reconnect_attempts: u32,
    pub pending_outbound_cap: usize,
    pub stream_channel_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: "https://statsapi.mlb.com/api/v1".to_string(),
            ws_url: "wss://feeds.blaze-intelligence.com/live".to_string(),
            platform: "web".to_string(),
            cache_default_ttl_ms: 300_000,
            cache_soft_limit: 100,
            cache_max_entries: 1_000,
            cache_sweep_interval_secs: 60,
            request_timeout_ms: 8_000,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 16_000,
            failure_threshold: 5,
            failure_window_ms: 60_000,
            circuit_open_base_ms: 30_000,
            circuit_open_max_ms: 300_000,
            ws_reconnect_base_delay_ms: 2_000,
            ws_reconnect_cap_exponent: 5,
            ws_reconnect_max_delay_ms: 60_000,
            ws_max_reconnect_attempts: 12,
            pending_outbound_cap: 64,
            stream_channel_size: 256,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        let defaults = Config::default();
        Config {
            api_base_url: env::var("BLAZE_API_BASE_URL").unwrap_or(defaults.api_base_url),
            ws_url: env::var("BLAZE_WS_URL").unwrap_or(defaults.ws_url),
            platform: env::var("BLAZE_PLATFORM").unwrap_or(defaults.platform),
            cache_default_ttl_ms: env::var("BLAZE_CACHE_DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_default_ttl_ms),
            cache_soft_limit: env::var("BLAZE_CACHE_SOFT_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_soft_limit),
            cache_max_entries: env::var("BLAZE_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_max_entries),
            cache_sweep_interval_secs: env::var("BLAZE_CACHE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_sweep_interval_secs),
            request_timeout_ms: env::var("BLAZE_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_ms),
            max_retries: env::var("BLAZE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay_ms: env::var("BLAZE_RETRY_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_base_delay_ms),
            retry_max_delay_ms: env::var("BLAZE_RETRY_MAX_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_max_delay_ms),
            failure_threshold: env::var("BLAZE_FAILURE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.failure_threshold),
            failure_window_ms: env::var("BLAZE_FAILURE_WINDOW_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.failure_window_ms),
            circuit_open_base_ms: env::var("BLAZE_CIRCUIT_OPEN_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.circuit_open_base_ms),
            circuit_open_max_ms: env::var("BLAZE_CIRCUIT_OPEN_MAX_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.circuit_open_max_ms),
            ws_reconnect_base_delay_ms: env::var("BLAZE_WS_RECONNECT_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ws_reconnect_base_delay_ms),
            ws_reconnect_cap_exponent: env::var("BLAZE_WS_RECONNECT_CAP_EXPONENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ws_reconnect_cap_exponent),
            ws_reconnect_max_delay_ms: env::var("BLAZE_WS_RECONNECT_MAX_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ws_reconnect_max_delay_ms),
            ws_max_reconnect_attempts: env::var("BLAZE_WS_MAX_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ws_max_reconnect_attempts),
            pending_outbound_cap: env::var("BLAZE_PENDING_OUTBOUND_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pending_outbound_cap),
            stream_channel_size: env::var("BLAZE_STREAM_CHANNEL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.stream_channel_size),
        }
    }

    pub fn validate_and_log(&self) {
        log::info!("Client configuration loaded: {:?}", self);
        if Url::parse(&self.api_base_url).is_err() {
            log::error!("BLAZE_API_BASE_URL is not a valid URL: {}", self.api_base_url);
        }
        match Url::parse(&self.ws_url) {
            Ok(url) if url.scheme() == "ws" || url.scheme() == "wss" => {}
            Ok(url) => log::error!("BLAZE_WS_URL must use ws:// or wss://, got {}", url.scheme()),
            Err(_) => log::error!("BLAZE_WS_URL is not a valid URL: {}", self.ws_url),
        }
        if self.failure_threshold == 0 {
            log::error!("BLAZE_FAILURE_THRESHOLD must be at least 1");
        }
        if self.pending_outbound_cap == 0 {
            log::error!("BLAZE_PENDING_OUTBOUND_CAP must be at least 1");
        }
    }
}
