use std::net::SocketAddr;
use std::str::FromStr;

use crate::pipeline::ORIGINAL_REFERENCE_PPI;

/// Application-level constants
pub const APP_NAME: &str = "Fotoreportage";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Form defaults, applied when the caller leaves a field out.
pub const DEFAULT_QUALITY: &str = "print";
pub const DEFAULT_COLUMNS: u32 = 2;
pub const DEFAULT_WHITESPACE_MM: f64 = 5.0;

pub const OUTPUT_FILENAME: &str = "Fotoreportage.docx";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;

pub const ENV_ADDR: &str = "FOTOREPORTAGE_ADDR";
pub const ENV_MAX_UPLOAD_MB: &str = "FOTOREPORTAGE_MAX_UPLOAD_MB";
pub const ENV_ORIGINAL_PPI: &str = "FOTOREPORTAGE_ORIGINAL_PPI";

/// Tracing filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "fotoreportage_lib=info,tower_http=info"
}

/// Server settings read from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub max_upload_bytes: usize,
    /// Density cap for the `original` preset.
    pub original_reference_ppi: u32,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys take the default;
    /// unparseable ones are logged and take the default too.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_upload_mb = parse_or(&lookup, ENV_MAX_UPLOAD_MB, DEFAULT_MAX_UPLOAD_MB)
            .max(1);
        let original_reference_ppi = match parse_or(&lookup, ENV_ORIGINAL_PPI, ORIGINAL_REFERENCE_PPI) {
            0 => {
                tracing::warn!(key = ENV_ORIGINAL_PPI, "Density must be positive, using default");
                ORIGINAL_REFERENCE_PPI
            }
            ppi => ppi,
        };

        Self {
            addr: parse_or(&lookup, ENV_ADDR, defaults.addr),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            original_reference_ppi,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            original_reference_ppi: ORIGINAL_REFERENCE_PPI,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_name_is_fotoreportage() {
        assert_eq!(APP_NAME, "Fotoreportage");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.addr.to_string(), DEFAULT_ADDR);
        assert_eq!(config.max_upload_bytes, 200 * 1024 * 1024);
        assert_eq!(config.original_reference_ppi, 330);
    }

    #[test]
    fn reads_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ENV_ADDR, "0.0.0.0:8080"),
            (ENV_MAX_UPLOAD_MB, "50"),
            (ENV_ORIGINAL_PPI, "600"),
        ]));
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.original_reference_ppi, 600);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ENV_ADDR, "not an address"),
            (ENV_MAX_UPLOAD_MB, "-3"),
            (ENV_ORIGINAL_PPI, "0"),
        ]));
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn default_filter_targets_this_crate() {
        assert!(default_log_filter().starts_with("fotoreportage_lib="));
    }
}
