use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use strum::{AsRefStr, Display, EnumString};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

pub struct BillingConfig {
    pub database_url: SecretString,
    pub database_max_connections: u32,
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Subscribers reconciled per page by `sync_all`.
    pub sync_batch_size: i64,
}

impl BillingConfig {
    pub fn from_env() -> Self {
        let database_url: SecretString =
            SecretString::new(get_env::<String>("DATABASE_URL").into());
        let database_max_connections: u32 = get_env_default("DATABASE_MAX_CONNECTIONS", 5);
        let log_filter: String =
            get_env_default("BILLING_LOG_FILTER", "subscriber_billing=info".to_string());
        let log_format: String = get_env_default("BILLING_LOG_FORMAT", "pretty".to_string());
        let sync_batch_size: i64 = get_env_default("BILLING_SYNC_BATCH_SIZE", 100);

        Self {
            database_url,
            database_max_connections,
            log_filter,
            log_format: parse_log_format(&log_format),
            sync_batch_size,
        }
    }
}

/// Unknown formats fall back to pretty output.
fn parse_log_format(raw: &str) -> LogFormat {
    raw.trim().parse().unwrap_or_else(|_| {
        eprintln!("Unknown BILLING_LOG_FORMAT {:?}, using pretty output", raw);
        LogFormat::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!(parse_log_format("json"), LogFormat::Json);
        assert_eq!(parse_log_format(" JSON "), LogFormat::Json);
        assert_eq!(parse_log_format("Pretty"), LogFormat::Pretty);
    }

    #[test]
    fn unknown_log_format_falls_back_to_pretty() {
        assert_eq!(parse_log_format("xml"), LogFormat::Pretty);
    }

    #[test]
    fn log_format_displays_snake_case() {
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(LogFormat::Pretty.as_ref(), "pretty");
    }
}
