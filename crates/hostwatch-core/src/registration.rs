use std::path::Path;

use serde::{Deserialize, Serialize};

const REGISTRATION_FILE: &str = "registration.json";

/// Identity the inventory server assigned to this agent.
///
/// Stored at `<data_dir>/registration.json`. Reports and heartbeats are
/// addressed to `agent_id`, so the agent refuses to run without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub agent_id: String,
    pub registered_at: String,
}

impl Registration {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            registered_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Load the stored registration. Missing, unreadable or blank-id files
    /// all mean "not registered".
    pub fn load(data_dir: &Path) -> Option<Self> {
        let path = data_dir.join(REGISTRATION_FILE);
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<Self>(&s).ok())
            .filter(|r| !r.agent_id.trim().is_empty())
    }

    pub fn save(&self, data_dir: &Path) -> crate::error::Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(data_dir.join(REGISTRATION_FILE), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_registration_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let registration = Registration::new("42");
        registration.save(dir.path()).unwrap();

        assert_eq!(Registration::load(dir.path()), Some(registration));
    }

    #[test]
    fn save_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("agent");
        Registration::new("a-1").save(&nested).unwrap();
        assert_eq!(Registration::load(&nested).unwrap().agent_id, "a-1");
    }

    #[test]
    fn missing_or_corrupt_file_means_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Registration::load(dir.path()).is_none());

        std::fs::write(dir.path().join(REGISTRATION_FILE), "{not json").unwrap();
        assert!(Registration::load(dir.path()).is_none());
    }

    #[test]
    fn blank_agent_id_means_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        Registration::new("  ").save(dir.path()).unwrap();
        assert!(Registration::load(dir.path()).is_none());
    }
}
