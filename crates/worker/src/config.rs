use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shopmig_core::media::DEFAULT_FILE_CHUNK_BYTES;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Media worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Root directory downloaded files are written to.
    pub media_dir: PathBuf,
    pub poll_interval: Duration,
    /// Media files per process-media message.
    pub chunk_size: usize,
    /// Bytes requested per HTTP range request.
    pub file_chunk_bytes: u64,
    /// Messages processed concurrently.
    pub concurrency: usize,
    pub http_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default   |
    /// |----------------------------|-----------|
    /// | `DATABASE_URL`             | required  |
    /// | `MEDIA_DIR`                | `./media` |
    /// | `MEDIA_POLL_INTERVAL_SECS` | `5`       |
    /// | `MEDIA_CHUNK_SIZE`         | `10`      |
    /// | `MEDIA_FILE_CHUNK_BYTES`   | `1048576` |
    /// | `MEDIA_CONCURRENCY`        | `4`       |
    /// | `HTTP_TIMEOUT_SECS`        | `30`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let media_dir = lookup("MEDIA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./media"));

        let poll_interval_secs: u64 = parse_or(&lookup, "MEDIA_POLL_INTERVAL_SECS", 5)?;
        let chunk_size: usize = parse_or(&lookup, "MEDIA_CHUNK_SIZE", 10)?;
        let file_chunk_bytes: u64 =
            parse_or(&lookup, "MEDIA_FILE_CHUNK_BYTES", DEFAULT_FILE_CHUNK_BYTES)?;
        let concurrency: usize = parse_or(&lookup, "MEDIA_CONCURRENCY", 4)?;
        let http_timeout_secs: u64 = parse_or(&lookup, "HTTP_TIMEOUT_SECS", 30)?;

        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                var: "MEDIA_CHUNK_SIZE",
                value: "0".into(),
            });
        }
        if file_chunk_bytes == 0 {
            return Err(ConfigError::Invalid {
                var: "MEDIA_FILE_CHUNK_BYTES",
                value: "0".into(),
            });
        }

        Ok(Self {
            database_url,
            media_dir,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            chunk_size,
            file_chunk_bytes,
            concurrency: concurrency.max(1),
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = WorkerConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://db")])).unwrap();

        assert_eq!(config.media_dir, PathBuf::from("./media"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.file_chunk_bytes, 1024 * 1024);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("MEDIA_DIR", "/var/media"),
            ("MEDIA_CHUNK_SIZE", " 25 "),
            ("MEDIA_CONCURRENCY", "0"),
        ]))
        .unwrap();

        assert_eq!(config.media_dir, PathBuf::from("/var/media"));
        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn database_url_is_required() {
        let err = WorkerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_matches!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("MEDIA_POLL_INTERVAL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "MEDIA_POLL_INTERVAL_SECS", .. });

        let err = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("MEDIA_CHUNK_SIZE", "0"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "MEDIA_CHUNK_SIZE has invalid value \"0\"");
    }
}
