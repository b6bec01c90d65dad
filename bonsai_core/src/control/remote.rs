//! Controlling a behavior in-process or through a daemon.
//!
//! [`RemoteControl`] is the protocol shared by [`LocalRemote`] (direct calls)
//! and [`HttpRemote`] (JSON over HTTP against `bonsai_daemon`). The request and
//! response bodies below are the daemon's wire format.

use crate::control::controller::{ControllerStatus, StateMachineController};
use crate::control::loader::LoadingResults;
use crate::error::{BonsaiError, BonsaiResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DAEMON_PORT: u16 = 8090;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    /// File path on the daemon host, or an inline SCXML document
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRequest {
    pub event: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatesResponse {
    pub current_states: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Lifecycle and query operations on a (possibly remote) controller.
pub trait RemoteControl: Send + Sync {
    fn load(&self, source: &str) -> BonsaiResult<LoadingResults>;
    fn start(&self) -> BonsaiResult<()>;
    fn stop(&self) -> BonsaiResult<()>;
    fn pause(&self) -> BonsaiResult<()>;
    fn resume(&self) -> BonsaiResult<()>;
    /// `Ok(false)` when the event was not accepted (nothing running)
    fn fire_event(&self, event: &str) -> BonsaiResult<bool>;
    fn current_states(&self) -> BonsaiResult<Vec<String>>;
    fn status(&self) -> BonsaiResult<ControllerStatus>;
}

/// In-process remote over a shared controller.
#[derive(Debug, Clone)]
pub struct LocalRemote {
    controller: Arc<StateMachineController>,
}

impl LocalRemote {
    pub fn new(controller: Arc<StateMachineController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<StateMachineController> {
        &self.controller
    }
}

impl RemoteControl for LocalRemote {
    fn load(&self, source: &str) -> BonsaiResult<LoadingResults> {
        Ok(self.controller.load(source))
    }

    fn start(&self) -> BonsaiResult<()> {
        self.controller.start()
    }

    fn stop(&self) -> BonsaiResult<()> {
        self.controller.stop()
    }

    fn pause(&self) -> BonsaiResult<()> {
        self.controller.pause()
    }

    fn resume(&self) -> BonsaiResult<()> {
        self.controller.resume()
    }

    fn fire_event(&self, event: &str) -> BonsaiResult<bool> {
        Ok(self.controller.fire_event(event))
    }

    fn current_states(&self) -> BonsaiResult<Vec<String>> {
        Ok(self.controller.current_states())
    }

    fn status(&self) -> BonsaiResult<ControllerStatus> {
        Ok(self.controller.status())
    }
}

/// Base URL of a daemon from `host`, `host:port` or a full `http(s)://` URL.
pub fn normalize_url(addr: &str) -> String {
    let addr = addr.trim().trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else if addr.contains(':') {
        format!("http://{}", addr)
    } else {
        format!("http://{}:{}", addr, DEFAULT_DAEMON_PORT)
    }
}

/// Blocking HTTP client of `bonsai_daemon`.
///
/// Must not be used from inside an async runtime.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpRemote {
    pub fn new(addr: &str) -> BonsaiResult<Self> {
        Self::with_timeout(addr, Duration::from_secs(10))
    }

    pub fn with_timeout(addr: &str, timeout: Duration) -> BonsaiResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: normalize_url(addr),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn decode<T: DeserializeOwned>(response: reqwest::blocking::Response) -> BonsaiResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }

        let message = response
            .json::<ErrorResponse>()
            .map(|e| e.error)
            .unwrap_or_else(|_| status.to_string());
        Err(match status.as_u16() {
            404 => BonsaiError::NotLoaded,
            409 => BonsaiError::InvalidState(message),
            _ => BonsaiError::Remote(message),
        })
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> BonsaiResult<T> {
        tracing::debug!("GET {}", self.url(path));
        Self::decode(self.client.get(self.url(path)).send()?)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> BonsaiResult<T> {
        tracing::debug!("POST {}", self.url(path));
        Self::decode(self.client.post(self.url(path)).json(body).send()?)
    }

    fn command(&self, path: &str) -> BonsaiResult<()> {
        let _: ControllerStatus = self.post(path, &serde_json::json!({}))?;
        Ok(())
    }

    /// `true` if the daemon answers its health check.
    pub fn ping(&self) -> bool {
        self.client
            .get(self.url("/health"))
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

impl RemoteControl for HttpRemote {
    fn load(&self, source: &str) -> BonsaiResult<LoadingResults> {
        self.post(
            "/load",
            &LoadRequest {
                source: source.to_string(),
            },
        )
    }

    fn start(&self) -> BonsaiResult<()> {
        self.command("/start")
    }

    fn stop(&self) -> BonsaiResult<()> {
        self.command("/stop")
    }

    fn pause(&self) -> BonsaiResult<()> {
        self.command("/pause")
    }

    fn resume(&self) -> BonsaiResult<()> {
        self.command("/resume")
    }

    fn fire_event(&self, event: &str) -> BonsaiResult<bool> {
        let response: EventResponse = self.post(
            "/events",
            &EventRequest {
                event: event.to_string(),
            },
        )?;
        Ok(response.accepted)
    }

    fn current_states(&self) -> BonsaiResult<Vec<String>> {
        let response: StatesResponse = self.get("/states")?;
        Ok(response.current_states)
    }

    fn status(&self) -> BonsaiResult<ControllerStatus> {
        self.get("/status")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::CoreObjects;
    use crate::config::ControllerConfig;
    use crate::core::SkillRegistry;
    use crate::memory::WorkingMemory;

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url("robot"), "http://robot:8090");
        assert_eq!(normalize_url("10.0.0.2:9000"), "http://10.0.0.2:9000");
        assert_eq!(normalize_url("https://robot.local/"), "https://robot.local");
    }

    #[test]
    fn unreachable_daemon_is_a_remote_error() {
        let remote = HttpRemote::with_timeout("127.0.0.1:1", Duration::from_millis(200)).unwrap();
        assert!(!remote.ping());
        assert!(matches!(remote.status(), Err(BonsaiError::Remote(_))));
    }

    #[test]
    fn local_remote_drives_controller() {
        let controller = StateMachineController::new(
            ControllerConfig::testing(),
            SkillRegistry::with_builtins(),
            CoreObjects::new(),
            WorkingMemory::new(),
        )
        .unwrap();
        let remote: Box<dyn RemoteControl> = Box::new(LocalRemote::new(Arc::new(controller)));

        assert!(matches!(remote.start(), Err(BonsaiError::NotLoaded)));
        let results = remote
            .load(r#"<scxml initial="A"><state id="A"><transition event="next" target="B"/></state><state id="B"/></scxml>"#)
            .unwrap();
        assert!(results.success());

        remote.start().unwrap();
        assert!(remote.fire_event("next").unwrap());
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while remote.current_states().unwrap() != vec!["B".to_string()] {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(remote.status().unwrap().running);
        remote.stop().unwrap();
    }
}
