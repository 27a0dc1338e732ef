//! Runtime configuration: a pure mapping from an environment-variable
//! bag and a working directory to a typed record. A malformed value
//! falls back to its default; startup never fails over a single bad
//! knob.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use agentmonitor_engine::{UsageLimit, default_limits};

const ENV_PREFIX: &str = "AGENTMONITOR_";
/// The embedding desktop shell injects the same keys under this prefix;
/// a plain key wins over the desktop one, which wins over the default.
const DESKTOP_PREFIX: &str = "AGENTMONITOR_DESKTOP_";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub max_payload_kb: usize,
    pub idle_minutes: u64,
    pub live_feed_size: usize,
    pub stats_interval_ms: u64,
    pub max_sse_clients: usize,
    pub sse_heartbeat_ms: u64,
    /// 0 disables the auto-import tick.
    pub auto_import_minutes: u64,
    pub projects_root: PathBuf,
    pub usage_limits: BTreeMap<String, UsageLimit>,
}

impl Config {
    pub fn from_env() -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve(&env, &cwd)
    }

    pub fn resolve(env: &HashMap<String, String>, cwd: &Path) -> Self {
        let lookup = |suffix: &str| -> Option<&String> {
            env.get(&format!("{ENV_PREFIX}{suffix}"))
                .or_else(|| env.get(&format!("{DESKTOP_PREFIX}{suffix}")))
        };

        let parsed = |suffix: &str, default: u64| -> u64 {
            lookup(suffix)
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(default)
        };

        let projects_root = lookup("PROJECTS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| detect_projects_root(cwd));

        let usage_limits = lookup("USAGE_LIMITS")
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_else(default_limits);

        Self {
            host: lookup("HOST")
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: lookup("PORT")
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(3141),
            db_path: lookup("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/agentmonitor.db")),
            max_payload_kb: parsed("MAX_PAYLOAD_KB", 10) as usize,
            idle_minutes: parsed("IDLE_MINUTES", 5),
            live_feed_size: parsed("LIVE_FEED_SIZE", 200) as usize,
            stats_interval_ms: parsed("STATS_INTERVAL_MS", 5000),
            max_sse_clients: parsed("MAX_SSE_CLIENTS", 50) as usize,
            sse_heartbeat_ms: parsed("SSE_HEARTBEAT_MS", 30_000),
            auto_import_minutes: parsed("AUTO_IMPORT_MINUTES", 10),
            projects_root,
            usage_limits,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_kb * 1024
    }

    /// Sessions idle after this long without traffic; they end at twice
    /// this threshold.
    pub fn idle_threshold_secs(&self) -> u64 {
        self.idle_minutes * 60
    }
}

/// Nearest ancestor of the working directory that contains a `.git`
/// marker, falling back to the working directory itself.
fn detect_projects_root(cwd: &Path) -> PathBuf {
    let mut current = Some(cwd);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            // The projects root holds checkouts side by side
            return dir.parent().unwrap_or(dir).to_path_buf();
        }
        current = dir.parent();
    }
    cwd.to_path_buf()
}
