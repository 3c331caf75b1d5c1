//! Single-container start/stop.

use crate::error::ControlError;
use crate::model::{Action, Container};
use crate::runtime::{RuntimeClient, RuntimeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerOutcome {
    Applied,
    /// The runtime does not know this container. Recoverable: callers surface
    /// the message and keep rendering.
    Missing(String),
}

/// Invoke `action` on the container's runtime identifier. Transport failures
/// are errors; an unknown identifier is a `Missing` outcome.
pub async fn control_container(
    runtime: &dyn RuntimeClient,
    container: &Container,
    action: Action,
) -> Result<ContainerOutcome, ControlError> {
    match runtime.apply(&container.runtime_identifier, action).await {
        Ok(()) => {
            tracing::info!(
                container_id = container.id,
                runtime_identifier = %container.runtime_identifier,
                action = %action,
                "Container action applied"
            );
            Ok(ContainerOutcome::Applied)
        }
        Err(e @ RuntimeError::NotFound(_)) => {
            tracing::warn!(
                container_id = container.id,
                runtime_identifier = %container.runtime_identifier,
                action = %action,
                "Container unknown to runtime"
            );
            Ok(ContainerOutcome::Missing(e.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{fixtures::*, Inventory};
    use crate::runtime::testing::FakeRuntime;

    #[tokio::test]
    async fn start_and_stop_reach_the_runtime() {
        let mut inv = Inventory::default();
        let id = container(&mut inv, "web");
        let rt = FakeRuntime::with(&[("web-rt", "exited")]);
        let web = inv.container(id).unwrap();

        assert_eq!(
            control_container(&rt, web, Action::Start).await.unwrap(),
            ContainerOutcome::Applied
        );
        assert_eq!(rt.state_of("web-rt").as_deref(), Some("running"));
        control_container(&rt, web, Action::Stop).await.unwrap();
        assert_eq!(rt.state_of("web-rt").as_deref(), Some("exited"));
    }

    #[tokio::test]
    async fn unknown_identifier_is_a_soft_outcome() {
        let mut inv = Inventory::default();
        let id = container(&mut inv, "ghost");
        let rt = FakeRuntime::default();

        let out = control_container(&rt, inv.container(id).unwrap(), Action::Start)
            .await
            .unwrap();
        assert_eq!(out, ContainerOutcome::Missing("Container ghost-rt not found".into()));
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let mut inv = Inventory::default();
        let id = container(&mut inv, "web");
        let rt = FakeRuntime::with(&[("web-rt", "exited")]);
        rt.break_link("web-rt");

        let err = control_container(&rt, inv.container(id).unwrap(), Action::Start)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "runtime");
    }
}
