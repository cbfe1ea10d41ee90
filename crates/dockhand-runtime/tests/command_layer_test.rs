//! Command layer tests: typed runtime calls over a retrying executor backed
//! by the in-memory runtime.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use dockhand_common::config::RetryConfig;
use dockhand_common::error::DockhandError;
use dockhand_common::types::{ContainerName, OsFamily, ResourceKey, ResourceKind};
use dockhand_runtime::docker::{Context, DockerCli};
use dockhand_runtime::executor::CommandOutput;
use dockhand_runtime::fake::FakeDocker;
use dockhand_runtime::observed::ImageState;
use dockhand_runtime::platform::Platform;
use dockhand_runtime::retry::{RetryPolicy, RetryingExecutor};

fn retrying(fake: &Arc<FakeDocker>, attempts: u32) -> DockerCli {
    let policy = RetryPolicy::from(&RetryConfig {
        attempts,
        backoff_ms: 1,
        ..RetryConfig::default()
    });
    let executor = RetryingExecutor::new(Arc::clone(fake), policy);
    DockerCli::new(Arc::new(executor), Platform::new(OsFamily::Linux))
}

fn image_key() -> ResourceKey {
    ResourceKey::new(ResourceKind::Image, "alpine")
}

#[test]
fn transient_pull_failures_are_absorbed() {
    let fake = Arc::new(FakeDocker::new());
    fake.fail_next(
        &["pull"],
        CommandOutput::failed(1, "error: connection failure running docker pull"),
        2,
    );
    let docker = retrying(&fake, 5);
    let key = image_key();
    docker
        .pull(Context { resource: &key, action: "pull alpine" }, "alpine")
        .expect("pull should eventually succeed");

    assert_eq!(fake.mutations(), vec!["pull alpine"; 3]);
    assert!(matches!(
        docker.inspect_image(&key, "alpine").unwrap(),
        ImageState::Present { .. }
    ));
}

#[test]
fn exhausted_retries_surface_execution_error() {
    let fake = Arc::new(FakeDocker::new());
    fake.fail_next(
        &["pull"],
        CommandOutput::failed(1, "Cannot connect to the Docker daemon"),
        10,
    );
    let docker = retrying(&fake, 3);
    let key = image_key();
    let err = docker
        .pull(Context { resource: &key, action: "pull alpine" }, "alpine")
        .unwrap_err();

    assert_eq!(fake.invocations().len(), 3);
    let DockhandError::Execution { action, command, .. } = err else {
        panic!("expected execution error");
    };
    assert_eq!(action, "pull alpine");
    assert_eq!(command, "docker pull alpine");
}

#[test]
fn permanent_failures_fail_immediately() {
    let fake = Arc::new(FakeDocker::new());
    let docker = retrying(&fake, 5);
    let key = ResourceKey::new(ResourceKind::Run, "c1");
    let name = ContainerName::new("c1").unwrap();
    assert!(
        docker
            .stop(Context { resource: &key, action: "stop c1" }, &name)
            .is_err()
    );
    assert_eq!(fake.invocations().len(), 1);
}

#[test]
fn delayed_runtime_still_completes() {
    let fake = Arc::new(FakeDocker::new().with_delay(Duration::from_millis(5)));
    let docker = retrying(&fake, 1);
    let key = image_key();
    docker
        .pull(Context { resource: &key, action: "pull alpine" }, "alpine")
        .unwrap();
    assert_eq!(fake.peak_concurrency(), 1);
}
