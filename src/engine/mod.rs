//! The container-engine boundary.
//!
//! The rig depends on a container engine only through the
//! [`ContainerEngine`] trait: the handful of daemon operations the
//! orchestration core needs. [`DockerEngine`] implements it against the
//! Docker API; tests drive the core with a scripted engine instead.

mod docker;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

pub use docker::DockerEngine;

use crate::error::Result;

/// The host side of one explicit port publication.
///
/// The default binds an engine-assigned ephemeral port on all host
/// interfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPortSpec {
    /// Host interface to bind; the engine default (all interfaces) when
    /// unset.
    pub ip: Option<String>,
    /// Fixed host port; engine-assigned when unset.
    pub port: Option<u16>,
}

impl HostPortSpec {
    /// A fixed host port on all interfaces.
    pub fn port(port: u16) -> Self {
        Self {
            ip: None,
            port: Some(port),
        }
    }

    /// A fixed host port bound to one host interface.
    pub fn on_ip(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: Some(ip.into()),
            port: Some(port),
        }
    }
}

/// Everything the engine needs to create one container.
///
/// The container is created detached and unconnected to any custom network;
/// the core attaches it to the run's isolated network afterwards so alias
/// assignment is deterministic.
#[derive(Debug, Clone)]
pub struct EngineContainerSpec {
    /// Engine-side container name.
    pub name: String,
    /// Hostname inside the container.
    pub hostname: String,
    /// Full image reference.
    pub image: String,
    /// Environment as `KEY=value` pairs.
    pub env: Vec<String>,
    /// Command override, if any.
    pub command: Option<Vec<String>>,
    /// Container port to host-side binding.
    pub port_bindings: Vec<(u16, HostPortSpec)>,
    /// Whether to publish all exposed ports.
    pub publish_all_ports: bool,
}

/// One host-side binding of a published container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    /// The host IP the engine advertises, possibly empty or `0.0.0.0`.
    pub host_ip: String,
    /// The host port as reported by the engine.
    pub host_port: String,
}

/// The inspect subset the core needs to resolve reachability.
#[derive(Debug, Clone, Default)]
pub struct ContainerNetworkInfo {
    /// IP address on the engine's default bridge network, if assigned.
    pub bridge_ip: Option<String>,
    /// Per-network IP addresses, keyed by network name.
    pub network_ips: HashMap<String, String>,
    /// Published ports keyed as `"<port>/tcp"`. A key that is present with
    /// an empty list means the engine has not reported the binding yet.
    pub ports: HashMap<String, Vec<HostBinding>>,
}

impl ContainerNetworkInfo {
    /// The bindings for a TCP port, or `None` when the port is not
    /// published at all.
    pub fn tcp_bindings(&self, port: u16) -> Option<&[HostBinding]> {
        self.ports.get(&format!("{port}/tcp")).map(Vec::as_slice)
    }
}

/// Credentials passed along with a pull of a private image.
#[derive(Debug, Clone)]
pub struct PullAuth {
    /// Registry user name.
    pub username: String,
    /// Registry password.
    pub password: String,
    /// Registry server address, if known.
    pub server_address: Option<String>,
}

/// The daemon operations the orchestration core depends on.
///
/// Every call is blocking I/O against the engine with no explicit timeout;
/// callers needing cancellation wrap calls externally.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Verifies the engine is reachable.
    async fn ping(&self) -> Result<()>;

    /// Creates a bridge network and returns its id.
    async fn create_network(&self, name: &str) -> Result<String>;

    /// Removes a network by id.
    async fn remove_network(&self, id: &str) -> Result<()>;

    /// Lists ids of all containers (running or not) matching a name.
    async fn list_containers_by_name(&self, name: &str) -> Result<Vec<String>>;

    /// Creates a container and returns its id.
    async fn create_container(&self, spec: &EngineContainerSpec) -> Result<String>;

    /// Attaches a container to a network under a set of DNS aliases.
    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<()>;

    /// Starts a container.
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stops a container, allowing it `timeout_secs` to exit gracefully.
    async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()>;

    /// Removes a container.
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Fetches the raw container logs.
    async fn container_logs(&self, id: &str) -> Result<Vec<u8>>;

    /// Inspects a container's network state.
    async fn network_info(&self, id: &str) -> Result<ContainerNetworkInfo>;

    /// Pulls `image:tag`, optionally authenticating.
    async fn pull_image(&self, image: &str, tag: &str, auth: Option<PullAuth>) -> Result<()>;

    /// Uploads a tar archive into a container at the given directory.
    async fn upload_archive(&self, id: &str, target_dir: &Path, data: Vec<u8>) -> Result<()>;
}
