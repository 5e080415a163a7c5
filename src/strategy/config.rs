//! Environment-driven configuration with typed defaults.

use crate::DynError;

#[derive(Debug, Clone)]
pub struct GateCredentials {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct DeskConfig {
    pub default_symbol: String,
    pub gate: Option<GateCredentials>,
    pub mexc_auth_token: Option<String>,
    /// Distance (percent) each leg's price is pushed away from the touch.
    pub margin_pct: f64,
    pub leverage: f64,
    pub poll_interval_secs: u64,
    /// Reject execute when either touch moved more than this (percent)
    /// since a recent precheck for the same symbol/mode.
    pub max_book_drift_pct: f64,
    /// How long a precheck snapshot participates in the drift guard.
    pub precheck_ttl_secs: u64,
    /// Legacy reconciliation heuristic: treat a gate "order not found" as a
    /// full fill. Off by default; the default path flags the trade for
    /// manual review instead.
    pub assume_filled_on_not_found: bool,
    pub redis_url: String,
    pub listen_port: u16,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            default_symbol: "WMTX_USDT".to_string(),
            gate: None,
            mexc_auth_token: None,
            margin_pct: 10.0,
            leverage: 1.0,
            poll_interval_secs: 4,
            max_book_drift_pct: 0.5,
            precheck_ttl_secs: 30,
            assume_filled_on_not_found: false,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            listen_port: 3000,
        }
    }
}

impl DeskConfig {
    pub fn from_env() -> Result<Self, DynError> {
        let defaults = Self::default();

        let gate = match (
            std::env::var("GATE_API_KEY").ok().filter(|v| !v.is_empty()),
            std::env::var("GATE_API_SECRET").ok().filter(|v| !v.is_empty()),
        ) {
            (Some(api_key), Some(api_secret)) => Some(GateCredentials { api_key, api_secret }),
            (None, None) => None,
            _ => {
                return Err("incomplete gate credentials: both GATE_API_KEY and GATE_API_SECRET required".into())
            }
        };

        Ok(Self {
            default_symbol: std::env::var("DEFAULT_SYMBOL")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| v.to_uppercase())
                .unwrap_or(defaults.default_symbol),
            gate,
            mexc_auth_token: std::env::var("MEXC_AUTH_TOKEN").ok().filter(|v| !v.is_empty()),
            margin_pct: env_parsed("MARGIN_PCT", defaults.margin_pct),
            leverage: env_parsed("LEVERAGE", defaults.leverage),
            poll_interval_secs: env_parsed("POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            max_book_drift_pct: env_parsed("MAX_BOOK_DRIFT_PCT", defaults.max_book_drift_pct),
            precheck_ttl_secs: env_parsed("PRECHECK_TTL_SECS", defaults.precheck_ttl_secs),
            assume_filled_on_not_found: env_parsed(
                "ASSUME_FILLED_ON_NOT_FOUND",
                defaults.assume_filled_on_not_found,
            ),
            redis_url: std::env::var("REDIS_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.redis_url),
            listen_port: env_parsed("LISTEN_PORT", defaults.listen_port),
        })
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
