//! Per-container handles.

use std::sync::Weak;

use crate::engine::ContainerNetworkInfo;
use crate::error::{Result, RigError};
use crate::rig::{DumpOptions, RigCore};

/// A handle to one launched container.
///
/// Handles hold a weak reference to the rig that launched them, so a
/// lingering handle can never keep a torn-down rig (or its network) alive.
/// Every operation on a handle whose rig has been dropped fails with
/// [`RigError::RigGone`].
#[derive(Clone)]
pub struct ContainerHandle {
    core: Weak<RigCore>,
    container_id: String,
}

impl ContainerHandle {
    pub(crate) fn new(core: Weak<RigCore>, container_id: String) -> Self {
        Self { core, container_id }
    }

    fn core(&self) -> Result<std::sync::Arc<RigCore>> {
        self.core.upgrade().ok_or(RigError::RigGone)
    }

    /// The engine-side container id.
    pub fn id(&self) -> &str {
        &self.container_id
    }

    /// The logical service name this container was launched under.
    pub async fn service_name(&self) -> Result<String> {
        self.core()?.service_name(&self.container_id).await
    }

    /// Finds a host/port the test process can actually connect to for an
    /// internal container port.
    pub async fn connectable_host_and_port(&self, internal_port: u16) -> Result<(String, u16)> {
        self.core()?
            .connectable_host_and_port(&self.container_id, internal_port)
            .await
    }

    /// A base URL for a container port, built from the connectable
    /// host/port.
    pub async fn base_url(&self, internal_port: u16, scheme: &str) -> Result<String> {
        self.core()?
            .base_url_for_container(&self.container_id, internal_port, scheme)
            .await
    }

    /// The host-side binding of a published port, or `None` when the port
    /// is not published at all.
    pub async fn port_bindings(&self, internal_port: u16) -> Result<Option<(String, u16)>> {
        self.core()?
            .port_bindings(&self.container_id, internal_port)
            .await
    }

    /// The container's IP on the engine's default bridge network.
    pub async fn bridge_ip(&self) -> Result<String> {
        self.core()?.resolve_bridge_ip(&self.container_id).await
    }

    /// The container's IP on the run's isolated network.
    pub async fn isolated_network_ip(&self) -> Result<String> {
        self.core()?
            .resolve_isolated_network_ip(&self.container_id)
            .await
    }

    /// The network-state subset of the container's inspect data.
    pub async fn network_info(&self) -> Result<ContainerNetworkInfo> {
        self.core()?.network_info(&self.container_id).await
    }

    /// The container's logs, decoded and trimmed.
    pub async fn logs(&self) -> Result<String> {
        self.core()?.container_logs(&self.container_id).await
    }

    /// Dumps the container's logs to stdout.
    pub async fn dump_logs_to_stdout(&self, options: DumpOptions) -> Result<()> {
        self.core()?
            .dump_logs_to_stdout(&self.container_id, options)
            .await
    }

    /// Stops the container.
    pub async fn stop(&self, timeout_secs: u32) -> Result<()> {
        self.core()?
            .stop_container(&self.container_id, timeout_secs)
            .await
    }

    /// Starts the container after a stop.
    pub async fn start(&self) -> Result<()> {
        self.core()?.start_container(&self.container_id).await
    }

    /// Forcibly removes the container from the rig.
    pub async fn remove(&self) -> Result<()> {
        self.core()?.remove(&self.container_id).await
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("container_id", &self.container_id)
            .field("rig_alive", &(self.core.strong_count() > 0))
            .finish()
    }
}
