//! HTTP client for the inventory server.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hostwatch_core::{config::ApiConfig, update::AgentRelease, HostwatchError, Result};
use serde::Serialize;
use tracing::debug;

use crate::inventory::InventorySnapshot;

pub const REGISTER_PATH: &str = "/api/agents/register";
pub const LATEST_VERSION_PATH: &str = "/api/agents/latest-version";

/// Body of the registration request.
#[derive(Debug, Serialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub version: String,
    pub os_type: String,
    pub registered_at: DateTime<Utc>,
}

impl RegistrationRequest {
    pub fn from_snapshot(snapshot: &InventorySnapshot) -> Self {
        Self {
            name: snapshot.hostname.clone(),
            version: snapshot.agent_version.clone(),
            os_type: format!("{} {}", snapshot.os_name, snapshot.os_version),
            registered_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct InventoryReport<'a> {
    agent_id: &'a str,
    timestamp: DateTime<Utc>,
    data: &'a InventorySnapshot,
}

#[derive(Serialize)]
struct Heartbeat<'a> {
    agent_id: &'a str,
    timestamp: DateTime<Utc>,
    status: &'static str,
}

/// Cheap to clone; every job closure holds its own copy.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
    agent_id: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("hostwatch-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HostwatchError::Api(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: config.timeout(),
            agent_id: None,
        })
    }

    /// Address agent-scoped calls to `agent_id`.
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn agent_id(&self) -> Result<&str> {
        self.agent_id.as_deref().ok_or(HostwatchError::NotRegistered)
    }

    fn agent_url(&self, agent_id: &str, action: &str) -> String {
        self.url(&format!("/api/agents/{agent_id}/{action}"))
    }

    fn classify(&self, e: reqwest::Error) -> HostwatchError {
        if e.is_timeout() {
            HostwatchError::Timeout {
                ms: self.timeout.as_millis() as u64,
            }
        } else {
            HostwatchError::Api(e.to_string())
        }
    }

    /// Register this host and return the id the server assigned.
    ///
    /// The id is read from `agent_id`, falling back to `id`; either may be a
    /// string or a number.
    pub async fn register(&self, request: &RegistrationRequest) -> Result<String> {
        let body: serde_json::Value = self
            .http
            .post(self.url(REGISTER_PATH))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.classify(e))?
            .json()
            .await
            .map_err(|e| self.classify(e))?;

        let agent_id = ["agent_id", "id"]
            .iter()
            .filter_map(|key| body.get(*key))
            .find_map(|value| match value {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| HostwatchError::Api("registration response has no agent_id".into()))?;
        debug!(%agent_id, "registration accepted");
        Ok(agent_id)
    }

    /// POST one inventory snapshot.
    pub async fn send_report(&self, snapshot: &InventorySnapshot) -> Result<()> {
        let agent_id = self.agent_id()?;
        let report = InventoryReport {
            agent_id,
            timestamp: Utc::now(),
            data: snapshot,
        };
        self.http
            .post(self.agent_url(agent_id, "inventory"))
            .bearer_auth(&self.token)
            .json(&report)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.classify(e))?;
        debug!(hostname = %snapshot.hostname, "inventory report accepted");
        Ok(())
    }

    /// Tell the server this agent is alive. Non-2xx is an error.
    pub async fn heartbeat(&self) -> Result<()> {
        let agent_id = self.agent_id()?;
        let beat = Heartbeat {
            agent_id,
            timestamp: Utc::now(),
            status: "active",
        };
        self.http
            .post(self.agent_url(agent_id, "heartbeat"))
            .bearer_auth(&self.token)
            .json(&beat)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    /// Latest agent release advertised by the server.
    pub async fn latest_release(&self) -> Result<AgentRelease> {
        self.http
            .get(self.url(LATEST_VERSION_PATH))
            .bearer_auth(&self.token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.classify(e))?
            .json::<AgentRelease>()
            .await
            .map_err(|e| self.classify(e))
    }
}
