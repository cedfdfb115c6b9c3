//! Docker API wrapper using the bollard crate.
//!
//! [`DockerEngine`] implements [`ContainerEngine`] on top of a shared
//! `bollard::Docker` handle, which is cheap to clone and safe to use from many
//! tasks at once.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use tracing::{debug, info};

use crate::engine::gateway::{
    ContainerEngine, ContainerSpec, EngineInspect, LogFrame, LogFrameStream, LogSource, LogTail,
};
use crate::error::EngineError;

/// Seconds to wait for a connection or response from the daemon.
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Docker-backed container engine.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
    stop_timeout_secs: i64,
}

impl DockerEngine {
    /// Connects to the local Docker daemon using the platform defaults
    /// (`DOCKER_HOST` or the local socket).
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DaemonUnavailable` if the client cannot be built.
    pub fn new() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::from_docker(docker))
    }

    /// Connects to an explicit daemon address (`unix://...`, `tcp://...` or
    /// `http://...`).
    pub fn connect(host: &str) -> Result<Self, EngineError> {
        let docker = if let Some(path) = host.strip_prefix("unix://") {
            Docker::connect_with_unix(path, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            let addr = host.replacen("tcp://", "http://", 1);
            Docker::connect_with_http(&addr, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        .map_err(|e| EngineError::DaemonUnavailable(format!("Failed to connect to {host}: {e}")))?;

        Ok(Self::from_docker(docker))
    }

    /// Wraps an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self {
            docker,
            stop_timeout_secs: 10,
        }
    }

    /// Seconds the engine waits after SIGTERM before SIGKILL on stop.
    pub fn with_stop_timeout(mut self, secs: i64) -> Self {
        self.stop_timeout_secs = secs;
        self
    }

    /// Checks the daemon is reachable.
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map_err(|e| EngineError::DaemonUnavailable(e.to_string()))?;
        Ok(())
    }
}

/// Builds the bollard container config for a sandbox spec.
fn container_config(spec: &ContainerSpec) -> Config<String> {
    let port_key = spec.exposed_port_key();

    let mut exposed_ports = HashMap::new();
    exposed_ports.insert(port_key.clone(), HashMap::new());

    let mut port_bindings = HashMap::new();
    port_bindings.insert(
        port_key,
        Some(vec![PortBinding {
            host_ip: None,
            host_port: Some(spec.host_port.to_string()),
        }]),
    );

    let host_config = HostConfig {
        port_bindings: Some(port_bindings),
        memory: Some(spec.limits.memory_bytes()),
        cpu_period: Some(spec.limits.cpu_period()),
        cpu_quota: Some(spec.limits.cpu_quota()),
        restart_policy: Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::NO),
            maximum_retry_count: None,
        }),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: if spec.cmd.is_empty() {
            None
        } else {
            Some(spec.cmd.clone())
        },
        env: if spec.env.is_empty() {
            None
        } else {
            Some(spec.env.clone())
        },
        exposed_ports: Some(exposed_ports),
        working_dir: Some(spec.working_dir.clone()),
        host_config: Some(host_config),
        tty: Some(true),
        attach_stdin: Some(false),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    }
}

/// Maps a bollard error, turning HTTP 404 into `ContainerNotFound`.
fn map_container_error(id: &str, action: &str, err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => EngineError::ContainerNotFound { id: id.to_string() },
        other if other.to_string().contains("No such container") => {
            EngineError::ContainerNotFound { id: id.to_string() }
        }
        other => EngineError::RequestFailed(format!("Failed to {action} container: {other}")),
    }
}

fn log_frame(output: LogOutput) -> Option<LogFrame> {
    match output {
        LogOutput::StdOut { message } => Some(LogFrame::new(LogSource::Stdout, message.to_vec())),
        LogOutput::StdErr { message } => Some(LogFrame::new(LogSource::Stderr, message.to_vec())),
        LogOutput::Console { message } => {
            Some(LogFrame::new(LogSource::Console, message.to_vec()))
        }
        LogOutput::StdIn { .. } => None,
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|e| EngineError::RequestFailed(format!("Failed to create container: {e}")))?;

        debug!(engine_id = %response.id, name = %spec.name, "Engine container created");
        Ok(response.id)
    }

    async fn start_container(&self, engine_id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(engine_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_container_error(engine_id, "start", e))
    }

    async fn stop_container(&self, engine_id: &str) -> Result<(), EngineError> {
        let options = StopContainerOptions {
            t: self.stop_timeout_secs,
        };

        self.docker
            .stop_container(engine_id, Some(options))
            .await
            .map_err(|e| map_container_error(engine_id, "stop", e))
    }

    async fn remove_container(&self, engine_id: &str, force: bool) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(engine_id, Some(options))
            .await
            .map_err(|e| map_container_error(engine_id, "remove", e))
    }

    async fn inspect_container(&self, engine_id: &str) -> Result<EngineInspect, EngineError> {
        let info = self
            .docker
            .inspect_container(engine_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_container_error(engine_id, "inspect", e))?;

        let state = info.state.unwrap_or_default();

        Ok(EngineInspect {
            status: state.status.map(|s| s.to_string()).unwrap_or_default(),
            exit_code: state.exit_code,
        })
    }

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(EngineError::RequestFailed(format!(
                "Failed to inspect image {image}: {e}"
            ))),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        info!(image = %image, "Pulling image");
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            let progress = result.map_err(|e| EngineError::PullFailed(format!("{image}: {e}")))?;
            if let Some(status) = progress.status {
                debug!(image = %image, status = %status, "Pull progress");
            }
        }

        Ok(())
    }

    fn stream_logs(&self, engine_id: &str, tail: LogTail, follow: bool) -> LogFrameStream {
        let options = LogsOptions::<String> {
            follow,
            stdout: true,
            stderr: true,
            timestamps: false,
            tail: tail.as_query(),
            ..Default::default()
        };

        let id = engine_id.to_string();
        let stream = self
            .docker
            .logs(engine_id, Some(options))
            .filter_map(move |chunk| {
                let item = match chunk {
                    Ok(output) => log_frame(output).map(Ok),
                    Err(e) => Some(Err(match map_container_error(&id, "read logs of", e) {
                        EngineError::RequestFailed(msg) => EngineError::LogStream(msg),
                        other => other,
                    })),
                };
                futures::future::ready(item)
            });

        Box::pin(stream)
    }
}
