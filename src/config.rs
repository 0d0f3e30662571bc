use std::path::PathBuf;
use std::time::Duration;

pub const ENV_WORKSPACE: &str = "SESSIOND_WORKSPACE";
pub const ENV_LOG_JSON: &str = "SESSIOND_LOG_JSON";
pub const ENV_RESET_BACKUP_DIR: &str = "SESSIOND_RESET_BACKUP_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "SESSIOND_BUSY_TIMEOUT_MS";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
    pub log_json: bool,
    /// When set, `admin.resetAll` writes a bundle here before deleting anything.
    pub reset_backup_dir: Option<PathBuf>,
    pub busy_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workspace: None,
            log_json: false,
            reset_backup_dir: None,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Config {
            workspace: path(ENV_WORKSPACE),
            log_json: parse_bool(lookup(ENV_LOG_JSON).as_deref(), false),
            reset_backup_dir: path(ENV_RESET_BACKUP_DIR),
            busy_timeout: Duration::from_millis(parse_u64(
                lookup(ENV_BUSY_TIMEOUT_MS).as_deref(),
                DEFAULT_BUSY_TIMEOUT_MS,
            )),
        }
    }
}

fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    raw.and_then(|v| match v.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    })
    .unwrap_or(default)
}

fn parse_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
