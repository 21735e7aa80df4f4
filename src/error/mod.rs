use log::warn;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Operation exceeded its hard timeout
    #[error("Timeout Error: {0}")]
    Timeout(String),

    /// Network/connection failure before an HTTP status was produced
    #[error("Transport Error: {0}")]
    Transport(String),

    /// Remote answered with a non-2xx status
    #[error("HTTP Status Error: {0}")]
    HttpStatus(u16),

    /// Retries exhausted, circuit open, and no cache or fallback exists.
    /// Terminal: callers must handle this, it is never swallowed into a
    /// default value.
    #[error("Remote Unavailable: {0}")]
    RemoteUnavailable(String),

    /// A push message failed to parse; logged and dropped by the
    /// dispatch loop, never fatal to the connection
    #[error("Malformed Message: {0}")]
    MalformedMessage(String),

    /// Stream client exceeded its reconnect budget. Terminal.
    #[error("Reconnect Exhausted: {0}")]
    ReconnectExhausted(String),

    #[error("Circuit breaker is open, operation blocked")]
    CircuitOpen,

    /// Stream connection/handshake issues
    #[error("Stream Error: {0}")]
    StreamError(String),

    /// Subscription bookkeeping errors (unknown topic, closed channel)
    #[error("Subscription Error: {0}")]
    Subscription(String),

    /// Parsing errors for payload data
    #[error("Parse Error: {0}")]
    Parse(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    Config(String),

    /// Cache bookkeeping errors
    #[error("Cache Error: {0}")]
    Cache(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(format!("HTTP request timed out: {}", err))
        } else if let Some(status) = err.status() {
            SyncError::HttpStatus(status.as_u16())
        } else {
            SyncError::Transport(format!("HTTP transport error: {}", err))
        }
    }
}

impl SyncError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Timeout(_) => true,
            SyncError::Transport(_) => true,
            // Server-side and throttling statuses recover; client errors need fixing
            SyncError::HttpStatus(status) => *status >= 500 || *status == 429 || *status == 408,
            SyncError::RemoteUnavailable(_) => false,
            SyncError::MalformedMessage(_) => false, // Data format issues aren't recoverable
            SyncError::ReconnectExhausted(_) => false,
            SyncError::CircuitOpen => false, // Not recoverable by immediate retry
            SyncError::StreamError(_) => true,
            SyncError::Subscription(_) => false,
            SyncError::Parse(_) => false,
            SyncError::Config(_) => false, // Config needs fixing
            SyncError::Cache(_) => true,
        }
    }

    /// Determines if the operation should be retried immediately
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && match self {
                SyncError::Timeout(_) => true,
                SyncError::Transport(_) => true,
                SyncError::HttpStatus(status) => *status >= 500 || *status == 429 || *status == 408,
                SyncError::StreamError(_) => true,
                SyncError::Cache(_) => false, // A cache problem isn't fixed by re-running the op
                _ => false,
            }
    }

    /// Categorizes the error for logging and monitoring
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            SyncError::Timeout(_) | SyncError::Transport(_) | SyncError::HttpStatus(_) => {
                ErrorCategory::Network
            }
            SyncError::RemoteUnavailable(_) => ErrorCategory::Availability,
            SyncError::MalformedMessage(_) | SyncError::Parse(_) => ErrorCategory::Data,
            SyncError::ReconnectExhausted(_) | SyncError::StreamError(_) => ErrorCategory::DataFeed,
            SyncError::CircuitOpen => ErrorCategory::Safety,
            SyncError::Subscription(_) => ErrorCategory::DataFeed,
            SyncError::Config(_) => ErrorCategory::Configuration,
            SyncError::Cache(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Log a transient error at warn level and return it, for retry sites
    pub fn warned(self, context: &str) -> Self {
        warn!("{}: {}", context, self);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    Network,
    DataFeed,
    Data,
    Availability,
    Safety,
    Configuration,
    Infrastructure,
}

pub type Result<T> = std::result::Result<T, SyncError>;
