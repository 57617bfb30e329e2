#![forbid(unsafe_code)]

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use rsvp_engines::rsvp_csv::RsvpCsvConfig;
use rsvp_engines::rsvp_intake::{AttendancePolicy, RsvpIntakeConfig};
use rsvp_storage::KV_LIST_LIMIT_MAX;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8787";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("RSVP_HTTP_BIND `{value}` is not a socket address")]
    InvalidBind { value: String },
    #[error("cannot read RSVP_ADMIN_TOKEN_FILE {}: {source}", path.display())]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How `Access-Control-Allow-Origin` is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsOrigin {
    Any,
    Echo,
}

impl CorsOrigin {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "*" | "any" => Some(CorsOrigin::Any),
            "echo" | "mirror" => Some(CorsOrigin::Echo),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct RsvpAdapterConfig {
    pub bind: SocketAddr,
    pub admin_token: Option<String>,
    pub store_path: Option<PathBuf>,
    pub cors_origin: CorsOrigin,
    pub intake: RsvpIntakeConfig,
    pub list_page_size: usize,
    pub csv: RsvpCsvConfig,
}

impl RsvpAdapterConfig {
    /// Loopback bind, in-memory store, no admin secret.
    pub fn mvp_v1() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
            admin_token: None,
            store_path: None,
            cors_origin: CorsOrigin::Any,
            intake: RsvpIntakeConfig::mvp_v1(),
            list_page_size: KV_LIST_LIMIT_MAX,
            csv: RsvpCsvConfig::mvp_v1(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_var_map(|key| env::var(key).ok())
    }

    /// Unparseable optional knobs fall back to their defaults with a warning.
    /// Only the bind address and an unreadable token file are fatal.
    pub fn from_var_map<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::mvp_v1();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = match var("RSVP_HTTP_BIND") {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|_| ConfigError::InvalidBind { value: raw })?,
            None => defaults.bind,
        };

        let admin_token = match (var("RSVP_ADMIN_TOKEN"), var("RSVP_ADMIN_TOKEN_FILE")) {
            (Some(token), _) => Some(token.trim().to_string()),
            (None, Some(path)) => read_token_file(PathBuf::from(path))?,
            (None, None) => None,
        };

        let cors_origin = parse_or_default(
            "RSVP_CORS_ORIGIN",
            var("RSVP_CORS_ORIGIN"),
            CorsOrigin::parse,
            defaults.cors_origin,
        );
        let attendance_policy = parse_or_default(
            "RSVP_ATTENDANCE_POLICY",
            var("RSVP_ATTENDANCE_POLICY"),
            AttendancePolicy::parse,
            defaults.intake.attendance_policy,
        );
        let name_min_chars = parse_or_default(
            "RSVP_NAME_MIN_CHARS",
            var("RSVP_NAME_MIN_CHARS"),
            |v| v.trim().parse::<usize>().ok().filter(|n| (1..=2).contains(n)),
            defaults.intake.name_min_chars,
        );
        let list_page_size = parse_or_default(
            "RSVP_LIST_PAGE_SIZE",
            var("RSVP_LIST_PAGE_SIZE"),
            |v| {
                v.trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| (1..=KV_LIST_LIMIT_MAX).contains(n))
            },
            defaults.list_page_size,
        );

        Ok(Self {
            bind,
            admin_token,
            store_path: var("RSVP_STORE_PATH").map(PathBuf::from),
            cors_origin,
            intake: RsvpIntakeConfig {
                attendance_policy,
                name_min_chars,
            },
            list_page_size,
            csv: RsvpCsvConfig {
                yes_token: var("RSVP_CSV_YES").unwrap_or(defaults.csv.yes_token),
                no_token: var("RSVP_CSV_NO").unwrap_or(defaults.csv.no_token),
            },
        })
    }
}

impl std::fmt::Debug for RsvpAdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsvpAdapterConfig")
            .field("bind", &self.bind)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("store_path", &self.store_path)
            .field("cors_origin", &self.cors_origin)
            .field("intake", &self.intake)
            .field("list_page_size", &self.list_page_size)
            .field("csv", &self.csv)
            .finish()
    }
}

fn parse_or_default<T, P>(key: &str, raw: Option<String>, parse: P, default: T) -> T
where
    P: Fn(&str) -> Option<T>,
{
    let Some(raw) = raw else {
        return default;
    };
    match parse(&raw) {
        Some(value) => value,
        None => {
            warn!(key, value = %raw, "ignoring invalid setting, using default");
            default
        }
    }
}

fn read_token_file(path: PathBuf) -> Result<Option<String>, ConfigError> {
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::TokenFile {
        path: path.clone(),
        source,
    })?;
    let token = raw.trim();
    Ok((!token.is_empty()).then(|| token.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<RsvpAdapterConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RsvpAdapterConfig::from_var_map(|key| map.get(key).cloned())
    }

    #[test]
    fn at_config_01_empty_environment_yields_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, RsvpAdapterConfig::mvp_v1());
        assert_eq!(config.bind.to_string(), DEFAULT_HTTP_BIND);
    }

    #[test]
    fn at_config_02_overrides_parse() {
        let config = from_pairs(&[
            ("RSVP_HTTP_BIND", "0.0.0.0:9000"),
            ("RSVP_ADMIN_TOKEN", "s3cret"),
            ("RSVP_STORE_PATH", "/var/lib/rsvp/journal.jsonl"),
            ("RSVP_CORS_ORIGIN", "echo"),
            ("RSVP_ATTENDANCE_POLICY", "require_explicit"),
            ("RSVP_NAME_MIN_CHARS", "2"),
            ("RSVP_LIST_PAGE_SIZE", "50"),
            ("RSVP_CSV_YES", "sim"),
            ("RSVP_CSV_NO", "não"),
        ])
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(config.cors_origin, CorsOrigin::Echo);
        assert_eq!(
            config.intake.attendance_policy,
            AttendancePolicy::RequireExplicit
        );
        assert_eq!(config.intake.name_min_chars, 2);
        assert_eq!(config.list_page_size, 50);
        assert_eq!(config.csv.no_token, "não");
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn at_config_03_out_of_range_knobs_fall_back() {
        let config = from_pairs(&[
            ("RSVP_NAME_MIN_CHARS", "9"),
            ("RSVP_LIST_PAGE_SIZE", "5000"),
            ("RSVP_CORS_ORIGIN", "https://example.org"),
            ("RSVP_ADMIN_TOKEN", "   "),
        ])
        .unwrap();
        assert_eq!(config, RsvpAdapterConfig::mvp_v1());
    }

    #[test]
    fn at_config_04_bad_bind_and_missing_token_file_are_fatal() {
        assert!(matches!(
            from_pairs(&[("RSVP_HTTP_BIND", "not-an-addr")]),
            Err(ConfigError::InvalidBind { .. })
        ));
        assert!(matches!(
            from_pairs(&[("RSVP_ADMIN_TOKEN_FILE", "/nonexistent/rsvp/token")]),
            Err(ConfigError::TokenFile { .. })
        ));
    }

    #[test]
    fn at_config_05_token_file_is_trimmed() {
        let path = std::env::temp_dir().join(format!(
            "rsvp_token_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::write(&path, "  s3cret\n").unwrap();
        let config = from_pairs(&[("RSVP_ADMIN_TOKEN_FILE", path.to_str().unwrap())]).unwrap();
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn at_config_06_env_token_is_trimmed_like_token_file() {
        let config = from_pairs(&[("RSVP_ADMIN_TOKEN", "  s3cret \n")]).unwrap();
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
    }
}
