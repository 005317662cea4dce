use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// Latest agent release as advertised by the inventory server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRelease {
    pub version: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
}

/// Result of comparing the running agent against the advertised release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateVerdict {
    UpToDate,
    Available { current: String, latest: String },
}

impl AgentRelease {
    pub fn verdict(&self, current: &str) -> UpdateVerdict {
        match compare_versions(current, &self.version) {
            Ordering::Less => UpdateVerdict::Available {
                current: current.to_string(),
                latest: self.version.clone(),
            },
            _ => UpdateVerdict::UpToDate,
        }
    }
}

/// Persistent state for the update-check job.
///
/// Stored at `<data_dir>/update-check.json` so a restarted agent does not
/// re-announce the same release.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateCheckState {
    pub last_checked_at: Option<String>,
    pub latest_version: Option<String>,
    pub notified: bool,
}

impl UpdateCheckState {
    /// Load state from `<data_dir>/update-check.json`. Returns defaults on any error.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("update-check.json");
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Persist state to `<data_dir>/update-check.json`.
    pub fn save(&self, data_dir: &Path) -> crate::error::Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(data_dir.join("update-check.json"), json)?;
        Ok(())
    }

    /// Record a completed check. Returns true when `latest` has not been
    /// announced before and should be logged.
    pub fn record(&mut self, latest: &str, update_available: bool) -> bool {
        let is_new = self.latest_version.as_deref() != Some(latest);
        self.last_checked_at = Some(chrono::Utc::now().to_rfc3339());
        self.latest_version = Some(latest.to_string());
        if is_new {
            self.notified = false;
        }
        let announce = update_available && !self.notified;
        if announce {
            self.notified = true;
        }
        announce
    }
}

/// Compare two semver version strings (e.g. "0.2.0" vs "0.3.0").
///
/// Only handles numeric 3-part versions; pre-release suffixes are ignored.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| -> (u64, u64, u64) {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let mut parts = s.split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch = parts
            .next()
            .and_then(|p| {
                // "1-rc.1" -> "1"
                let numeric: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
                numeric.parse().ok()
            })
            .unwrap_or(0);
        (major, minor, patch)
    };
    parse(a).cmp(&parse(b))
}
