//! cache.rs — small, single-writer, filesystem-backed key-value store
//!
//! Two independent JSON files under a platform cache directory:
//! `cloudflare_ip.json` (last-confirmed public IP) and `uptime.json`
//! (cumulative up/total cycle counters). Reads are tolerant — any absence
//! or corruption is a well-defined "miss", never a crash. Writes are
//! best-effort and atomic (write-to-temp + rename) to avoid torn JSON after
//! a crash.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Config;

const APP_DIR: &str = "update_dns";
const CLOUDFLARE_IP_FILE: &str = "cloudflare_ip.json";
const UPTIME_FILE: &str = "uptime.json";
const GOOGLE_SHEET_ID_FILE: &str = "google_sheet_id.txt";

/// Resolve the cache directory root, preferring `/data/cache` when running
/// containerized (`/.dockerenv` present), matching the original agent's
/// deployment layout.
pub fn cache_dir() -> PathBuf {
    let root = if Config::running_in_docker() {
        PathBuf::from("/data/cache")
    } else {
        dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."))
    };
    root.join(APP_DIR)
}

fn atomic_write(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedIpOnDisk {
    ip: String,
    stored_at: i64,
}

/// A cached public-IP observation, as read back from disk with derived
/// freshness fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedIp {
    pub hit: bool,
    pub ip: Option<String>,
    pub age_s: f64,
    pub elapsed_ms: f64,
}

impl CachedIp {
    fn miss() -> Self {
        Self {
            hit: false,
            ip: None,
            age_s: 0.0,
            elapsed_ms: 0.0,
        }
    }
}

/// Read/write store for the last-confirmed public IP. The DDNS reconciler
/// is the only writer.
pub struct IpCache {
    path: PathBuf,
}

impl IpCache {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CLOUDFLARE_IP_FILE),
        }
    }

    /// Read the cached IP, tolerating absence or corruption as a miss.
    pub fn load(&self) -> CachedIp {
        let start = std::time::Instant::now();
        let result = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str::<CachedIpOnDisk>(&raw).ok());

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Some(on_disk) => {
                let age_s = (Utc::now().timestamp() - on_disk.stored_at).max(0) as f64;
                CachedIp {
                    hit: true,
                    ip: Some(on_disk.ip),
                    age_s,
                    elapsed_ms,
                }
            }
            None => CachedIp {
                elapsed_ms,
                ..CachedIp::miss()
            },
        }
    }

    /// Persist `ip` as confirmed-current. Best-effort: write failures are
    /// logged by the caller and never abort the cycle.
    pub fn store(&self, ip: &str) -> std::io::Result<()> {
        let on_disk = CachedIpOnDisk {
            ip: ip.to_string(),
            stored_at: Utc::now().timestamp(),
        };
        let contents = serde_json::to_string_pretty(&on_disk)?;
        atomic_write(&self.path, &contents)
    }
}

/// Cumulative up/total cycle counters. `up <= total` always; both
/// monotonically non-decreasing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UptimeCounters {
    pub total: u64,
    pub up: u64,
}

impl std::fmt::Display for UptimeCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.up, self.total)
    }
}

pub struct UptimeStore {
    path: PathBuf,
}

impl UptimeStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(UPTIME_FILE),
        }
    }

    pub fn load(&self) -> UptimeCounters {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn store(&self, counters: UptimeCounters) -> std::io::Result<()> {
        let contents = serde_json::to_string_pretty(&counters)?;
        atomic_write(&self.path, &contents)
    }
}

/// Reserves the original agent's audit-sink cache file path so operators
/// migrating data between implementations see the same directory layout.
/// The core never reads this file.
pub fn google_sheet_id_path(dir: &Path) -> PathBuf {
    dir.join(GOOGLE_SHEET_ID_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_a_clean_miss() {
        let dir = tempdir().unwrap();
        let cache = IpCache::new(dir.path());
        let cached = cache.load();
        assert!(!cached.hit);
        assert_eq!(cached.ip, None);
    }

    #[test]
    fn corrupt_file_is_a_clean_miss() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CLOUDFLARE_IP_FILE), "not json").unwrap();
        let cache = IpCache::new(dir.path());
        let cached = cache.load();
        assert!(!cached.hit);
    }

    #[test]
    fn round_trip_preserves_ip_with_nonnegative_age() {
        let dir = tempdir().unwrap();
        let cache = IpCache::new(dir.path());
        cache.store("203.0.113.5").unwrap();
        let cached = cache.load();
        assert!(cached.hit);
        assert_eq!(cached.ip.as_deref(), Some("203.0.113.5"));
        assert!(cached.age_s >= 0.0);
    }

    #[test]
    fn uptime_round_trips_and_defaults_to_zero() {
        let dir = tempdir().unwrap();
        let store = UptimeStore::new(dir.path());
        assert_eq!(store.load(), UptimeCounters::default());

        let counters = UptimeCounters { total: 10, up: 7 };
        store.store(counters).unwrap();
        assert_eq!(store.load(), counters);
    }

    #[test]
    fn atomic_write_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let cache = IpCache::new(dir.path());
        cache.store("198.51.100.7").unwrap();
        assert!(!dir.path().join("cloudflare_ip.tmp").exists());
    }
}
