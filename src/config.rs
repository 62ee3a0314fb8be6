// src/config.rs

//! Runtime settings from the environment, with a file fallback for store
//! credentials.
//!
//! Missing required settings are a fatal startup error; this is the only
//! condition that terminates the process.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::utils::parse_duration;

/// Environment variable holding the store database path.
pub const ENV_DB_PATH: &str = "CIRCULARS_DB_PATH";
/// Environment variable holding the feed endpoint address.
pub const ENV_FEED_URL: &str = "CIRCULARS_FEED_URL";
/// Environment variable holding the cycle period (`30s`, `5m`, `2h`).
pub const ENV_CYCLE_WAIT: &str = "CIRCULARS_CYCLE_WAIT";
/// Optional environment variable overriding the cleanup cadence.
pub const ENV_CLEANUP_WAIT: &str = "CIRCULARS_CLEANUP_WAIT";

/// Default cadence for the destructive cleanup pass.
const DEFAULT_CLEANUP_WAIT: Duration = Duration::from_secs(6 * 60 * 60);

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Store database path
    pub db_path: PathBuf,

    /// Feed endpoint address
    pub feed_url: Url,

    /// Wait between sync cycles
    pub cycle_period: Duration,

    /// Wait between cleanup passes
    pub cleanup_period: Duration,
}

/// Store credentials file, consulted when the environment does not provide
/// the database path.
#[derive(Debug, Deserialize)]
struct StoreFile {
    db_path: PathBuf,
}

impl Settings {
    /// Resolve settings from the environment. `store_file` is read for the
    /// database path when the environment does not carry it.
    pub fn load(store_file: Option<&Path>) -> Result<Self> {
        let db_path = match env::var(ENV_DB_PATH) {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let path = store_file.ok_or_else(|| {
                    AppError::config(format!(
                        "missing {ENV_DB_PATH} and no store config file argument"
                    ))
                })?;
                db_path_from_file(path)?
            }
        };

        let feed_url = env::var(ENV_FEED_URL)
            .map_err(|_| AppError::config(format!("missing {ENV_FEED_URL}")))?;
        let feed_url = Url::parse(&feed_url)?;

        let cycle_raw = env::var(ENV_CYCLE_WAIT)
            .map_err(|_| AppError::config(format!("missing {ENV_CYCLE_WAIT}")))?;
        let cycle_period = parse_duration(&cycle_raw).ok_or_else(|| {
            AppError::config(format!("{ENV_CYCLE_WAIT} is not a parsable duration"))
        })?;

        let cleanup_period = match env::var(ENV_CLEANUP_WAIT) {
            Ok(raw) => parse_duration(&raw).ok_or_else(|| {
                AppError::config(format!("{ENV_CLEANUP_WAIT} is not a parsable duration"))
            })?,
            Err(_) => DEFAULT_CLEANUP_WAIT,
        };

        Ok(Self {
            db_path,
            feed_url,
            cycle_period,
            cleanup_period,
        })
    }
}

/// Read the database path from a TOML credentials file.
fn db_path_from_file(path: &Path) -> Result<PathBuf> {
    let raw = fs::read_to_string(path)?;
    let file: StoreFile = toml::from_str(&raw)?;
    Ok(file.db_path)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reads_db_path_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"db_path = "/var/lib/circulars/circulars.db""#).unwrap();

        let path = db_path_from_file(file.path()).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/circulars/circulars.db"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(db_path_from_file(Path::new("/nonexistent/creds.toml")).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not toml at all [").unwrap();
        assert!(db_path_from_file(file.path()).is_err());
    }
}
