//! Narrow client for the container runtime.
//!
//! The engine only ever needs three things from the runtime: the status of a
//! named workload, and starting or stopping it. An identifier the runtime does
//! not know is an expected outcome (`RuntimeError::NotFound`), kept apart from
//! transport failures.

use crate::model::Action;
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, StartContainerOptions, StopContainerOptions};
use bollard::Docker;
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Container {0} not found")]
    NotFound(String),

    #[error("runtime request for {identifier} failed: {reason}")]
    Transport { identifier: String, reason: String },
}

#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Runtime-defined state, e.g. `running` or `exited`.
    async fn status(&self, identifier: &str) -> Result<String, RuntimeError>;

    async fn start(&self, identifier: &str) -> Result<(), RuntimeError>;

    async fn stop(&self, identifier: &str) -> Result<(), RuntimeError>;

    async fn apply(&self, identifier: &str, action: Action) -> Result<(), RuntimeError> {
        match action {
            Action::Start => self.start(identifier).await,
            Action::Stop => self.stop(identifier).await,
        }
    }
}

/// Docker Engine backed runtime.
pub struct DockerRuntime {
    docker: Docker,
    stop_timeout: Duration,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's local socket.
    pub fn connect(stop_timeout: Duration) -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| anyhow::anyhow!("failed to connect to Docker: {e}"))?;
        tracing::info!(stop_timeout = ?stop_timeout, "Docker runtime client initialized");
        Ok(Self {
            docker,
            stop_timeout,
        })
    }

    fn map_err(identifier: &str, e: bollard::errors::Error) -> RuntimeError {
        match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => RuntimeError::NotFound(identifier.to_string()),
            other => RuntimeError::Transport {
                identifier: identifier.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// 304 means the container was already in the requested state.
    fn accept_not_modified(
        identifier: &str,
        res: Result<(), bollard::errors::Error>,
    ) -> Result<(), RuntimeError> {
        match res {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(Self::map_err(identifier, e)),
        }
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn status(&self, identifier: &str) -> Result<String, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(identifier, None::<InspectContainerOptions>)
            .await
            .map_err(|e| Self::map_err(identifier, e))?;
        Ok(inspect
            .state
            .and_then(|s| s.status)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string()))
    }

    async fn start(&self, identifier: &str) -> Result<(), RuntimeError> {
        let res = self
            .docker
            .start_container(identifier, None::<StartContainerOptions<String>>)
            .await;
        Self::accept_not_modified(identifier, res)
    }

    async fn stop(&self, identifier: &str) -> Result<(), RuntimeError> {
        let res = self
            .docker
            .stop_container(
                identifier,
                Some(StopContainerOptions {
                    t: self.stop_timeout.as_secs() as i64,
                }),
            )
            .await;
        Self::accept_not_modified(identifier, res)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory runtime that records every call with the (tokio) time it was made.

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CallKind {
        Status,
        Start,
        Stop,
    }

    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub kind: CallKind,
        pub identifier: String,
        pub at: Instant,
    }

    #[derive(Default)]
    pub struct FakeRuntime {
        states: Mutex<HashMap<String, String>>,
        unreachable: Mutex<HashSet<String>>,
        calls: Mutex<Vec<RecordedCall>>,
        status_delay: Duration,
    }

    impl FakeRuntime {
        pub fn with(workloads: &[(&str, &str)]) -> Self {
            let rt = Self::default();
            {
                let mut states = rt.states.lock().unwrap();
                for (name, state) in workloads {
                    states.insert(name.to_string(), state.to_string());
                }
            }
            rt
        }

        /// Every status call sleeps this long on the tokio timer first.
        pub fn with_status_delay(mut self, delay: Duration) -> Self {
            self.status_delay = delay;
            self
        }

        /// Make every call for `identifier` fail with a transport error.
        pub fn break_link(&self, identifier: &str) {
            self.unreachable
                .lock()
                .unwrap()
                .insert(identifier.to_string());
        }

        pub fn state_of(&self, identifier: &str) -> Option<String> {
            self.states.lock().unwrap().get(identifier).cloned()
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_of(&self, kind: CallKind) -> Vec<RecordedCall> {
            self.calls()
                .into_iter()
                .filter(|c| c.kind == kind)
                .collect()
        }

        fn record(&self, kind: CallKind, identifier: &str) -> Result<(), RuntimeError> {
            self.calls.lock().unwrap().push(RecordedCall {
                kind,
                identifier: identifier.to_string(),
                at: Instant::now(),
            });
            if self.unreachable.lock().unwrap().contains(identifier) {
                return Err(RuntimeError::Transport {
                    identifier: identifier.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            if !self.states.lock().unwrap().contains_key(identifier) {
                return Err(RuntimeError::NotFound(identifier.to_string()));
            }
            Ok(())
        }

        fn set(&self, identifier: &str, state: &str) {
            self.states
                .lock()
                .unwrap()
                .insert(identifier.to_string(), state.to_string());
        }
    }

    #[async_trait]
    impl RuntimeClient for FakeRuntime {
        async fn status(&self, identifier: &str) -> Result<String, RuntimeError> {
            if !self.status_delay.is_zero() {
                tokio::time::sleep(self.status_delay).await;
            }
            self.record(CallKind::Status, identifier)?;
            Ok(self.state_of(identifier).unwrap_or_default())
        }

        async fn start(&self, identifier: &str) -> Result<(), RuntimeError> {
            self.record(CallKind::Start, identifier)?;
            self.set(identifier, "running");
            Ok(())
        }

        async fn stop(&self, identifier: &str) -> Result<(), RuntimeError> {
            self.record(CallKind::Stop, identifier)?;
            self.set(identifier, "exited");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn fake_runtime_distinguishes_not_found_from_transport() {
        let rt = FakeRuntime::with(&[("web", "exited"), ("db", "running")]);
        rt.break_link("db");

        assert_eq!(rt.status("web").await.unwrap(), "exited");
        assert_eq!(
            rt.status("ghost").await,
            Err(RuntimeError::NotFound("ghost".into()))
        );
        assert!(matches!(
            rt.status("db").await,
            Err(RuntimeError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn apply_dispatches_on_action() {
        let rt = FakeRuntime::with(&[("web", "exited")]);
        rt.apply("web", Action::Start).await.unwrap();
        assert_eq!(rt.state_of("web").as_deref(), Some("running"));
        rt.apply("web", Action::Stop).await.unwrap();
        assert_eq!(rt.state_of("web").as_deref(), Some("exited"));
        assert_eq!(rt.calls_of(CallKind::Start).len(), 1);
        assert_eq!(rt.calls_of(CallKind::Stop).len(), 1);
    }
}
