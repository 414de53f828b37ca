use std::time::Duration;

/// How long a persisted call context stays recoverable by default.
pub const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(3000);

/// Session-level configuration.
///
/// Fills gaps in incoming calls and controls context-cache behavior.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Identifies this session in error details.
    pub session_identifier: String,
    /// Locale assigned to calls that arrive without one.
    pub default_locale: String,
    /// Data tenant assigned to calls that arrive without one.
    pub default_data_tenant: String,
    /// Expiry of context-cache entries.
    pub context_ttl: Duration,
    /// Whether clients created by this session recover cached contexts in
    /// `with_transaction_id`.
    pub match_sessions: bool,
    pub logging: LoggingConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session_identifier: String::new(),
            default_locale: "en-US".to_string(),
            default_data_tenant: String::new(),
            context_ttl: DEFAULT_CONTEXT_TTL,
            match_sessions: false,
            logging: LoggingConfig::default(),
        }
    }
}

/// Settings for [`init_tracing`](crate::logging::init_tracing).
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
