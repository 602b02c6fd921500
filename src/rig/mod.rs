//! The orchestration core: one isolated network, one registry of launched
//! containers, one run.

mod config;
mod handle;
mod spec;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use config::{RigConfig, RigConfigBuilder};
pub use handle::ContainerHandle;
pub use spec::{ImageSource, LaunchSpec, Mount, Ports};

use crate::engine::{
    ContainerEngine, ContainerNetworkInfo, DockerEngine, EngineContainerSpec, HostBinding, PullAuth,
};
use crate::error::{Result, RigError};
use crate::image::{DockerImage, RegistryDirectory};
use crate::routing::RoutingTable;

/// How long to wait for the engine to report a published port's binding
/// after container start.
const BOUND_PORTS_TIMEOUT: Duration = Duration::from_secs(15);
const BOUND_PORTS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Options for [`DockerRig::dump_logs_to_stdout`].
#[derive(Debug, Clone, Copy)]
pub struct DumpOptions {
    /// Skip the dump when this container's logs were already dumped.
    pub only_once: bool,
    /// Drop empty lines from the output.
    pub suppress_empty_lines: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            only_once: true,
            suppress_empty_lines: false,
        }
    }
}

#[derive(Debug)]
struct OwnedContainer {
    name: String,
}

#[derive(Default)]
struct RunState {
    owned: HashMap<String, OwnedContainer>,
    services: HashMap<String, String>,
    pulled_images: HashSet<DockerImage>,
    logs_dumped: HashSet<String>,
}

/// Shared core behind a [`DockerRig`] and its container handles.
pub(crate) struct RigCore {
    engine: Arc<dyn ContainerEngine>,
    config: RigConfig,
    registries: RegistryDirectory,
    run_id: String,
    network_name: String,
    network_id: String,
    state: RwLock<RunState>,
}

/// A session-scoped manager for ephemeral, networked test containers.
///
/// Construction creates one isolated bridge network named
/// `{basename}-defaultnet-{run_id}`; every launched container is attached to
/// it under DNS aliases, and [`remove_all`](Self::remove_all) tears down all
/// containers and the network at session end.
///
/// Mutating operations (`launch`, `remove`, `stop_container`,
/// `start_container`) are meant to be driven by a single logical thread of
/// control; reachability resolution is read-only and safe to call from
/// multiple readers.
///
/// # Examples
///
/// ```ignore
/// use dockrig::{DockerRig, LaunchSpec, Ports, RigConfig};
/// use dockrig::RegistryDirectory;
///
/// #[tokio::main]
/// async fn main() -> dockrig::Result<()> {
///     let rig = DockerRig::connect(RigConfig::from_env(), RegistryDirectory::from_env()?).await?;
///
///     let postgres = rig
///         .launch(
///             LaunchSpec::new("postgres", "postgres:16")
///                 .ports(Ports::Exposed(vec![5432]))
///                 .env("POSTGRES_PASSWORD", "secret"),
///         )
///         .await?;
///
///     let (host, port) = postgres.connectable_host_and_port(5432).await?;
///     println!("postgres reachable at {host}:{port}");
///
///     rig.remove_all().await?;
///     Ok(())
/// }
/// ```
pub struct DockerRig {
    core: Arc<RigCore>,
}

impl DockerRig {
    /// Connects to the local Docker daemon and creates the run's isolated
    /// network. A failure here leaves nothing behind and the rig unusable.
    pub async fn connect(config: RigConfig, registries: RegistryDirectory) -> Result<Self> {
        let engine = DockerEngine::connect(config.api_version).await?;
        Self::with_engine(Arc::new(engine), config, registries).await
    }

    /// Builds a rig on top of an existing engine client.
    pub async fn with_engine(
        engine: Arc<dyn ContainerEngine>,
        config: RigConfig,
        registries: RegistryDirectory,
    ) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let network_name = format!("{}-defaultnet-{}", config.basename, run_id);
        let network_id = engine.create_network(&network_name).await?;

        info!(run_id = %run_id, network = %network_name, "docker rig ready");

        Ok(Self {
            core: Arc::new(RigCore {
                engine,
                config,
                registries,
                run_id,
                network_name,
                network_id,
                state: RwLock::new(RunState::default()),
            }),
        })
    }

    /// The generated run identifier.
    pub fn run_id(&self) -> &str {
        &self.core.run_id
    }

    /// The name of the run's isolated network.
    pub fn network_name(&self) -> &str {
        &self.core.network_name
    }

    /// The rig configuration.
    pub fn config(&self) -> &RigConfig {
        &self.core.config
    }

    /// Launches a container and returns a handle to it.
    ///
    /// Qualifies and (at most once per distinct reference) pulls the image,
    /// force-removes any stale engine-side container with the same
    /// deterministic name, creates the container detached with its ports
    /// published, uploads mounts, attaches it to the isolated network under
    /// the full alias set, and starts it. On failure after creation the
    /// container stays registered so [`remove_all`](Self::remove_all) can
    /// clean it up.
    pub async fn launch(&self, spec: LaunchSpec) -> Result<ContainerHandle> {
        let container_id = self.core.launch(spec).await?;
        Ok(ContainerHandle::new(Arc::downgrade(&self.core), container_id))
    }

    /// Forcibly removes a container and forgets it.
    ///
    /// # Errors
    ///
    /// Fails with [`RigError::UnknownContainer`] if the id is not owned by
    /// this rig, including after a previous removal.
    pub async fn remove(&self, container_id: &str) -> Result<()> {
        self.core.remove(container_id).await
    }

    /// Removes every owned container and then the isolated network.
    ///
    /// Individual container removal failures are logged and skipped so one
    /// stuck container cannot prevent cleanup of the rest; a failure to
    /// remove the network itself propagates.
    pub async fn remove_all(&self) -> Result<()> {
        self.core.remove_all().await
    }

    /// Stops a container, by id or service name.
    pub async fn stop_container(&self, designation: &str, timeout_secs: u32) -> Result<()> {
        self.core.stop_container(designation, timeout_secs).await
    }

    /// Starts a stopped container, by id or service name.
    pub async fn start_container(&self, designation: &str) -> Result<()> {
        self.core.start_container(designation).await
    }

    /// The logical service name of a container.
    pub async fn service_name(&self, container_id: &str) -> Result<String> {
        self.core.service_name(container_id).await
    }

    /// Resolves a service name or container id to the container id.
    pub async fn find_id(&self, designation: &str) -> Result<String> {
        self.core.find_id(designation).await
    }

    /// Ids of all containers currently owned by this rig.
    pub async fn owned_container_ids(&self) -> Vec<String> {
        self.core.owned_container_ids().await
    }

    /// The container's logs, decoded and trimmed.
    pub async fn container_logs(&self, container_id: &str) -> Result<String> {
        self.core.container_logs(container_id).await
    }

    /// Dumps a container's logs to stdout, each line tagged with the
    /// service name and framed by banner lines.
    pub async fn dump_logs_to_stdout(&self, container_id: &str, options: DumpOptions) -> Result<()> {
        self.core.dump_logs_to_stdout(container_id, options).await
    }

    /// Finds a host/port the test process can actually connect to for an
    /// internal container port.
    ///
    /// Tries the cheapest paths first: the container's default-bridge IP if
    /// the host routing table can route there, then its isolated-network
    /// IP, and only then the published host-side binding. A missing routing
    /// table optimistically assumes the bridge IP is directly reachable,
    /// and the external-routing escape hatch skips straight to the
    /// published binding.
    pub async fn connectable_host_and_port(
        &self,
        container_id: &str,
        internal_port: u16,
    ) -> Result<(String, u16)> {
        self.core
            .connectable_host_and_port(container_id, internal_port)
            .await
    }

    /// A base URL for a container port, built from the connectable
    /// host/port.
    pub async fn base_url_for_container(
        &self,
        container_id: &str,
        internal_port: u16,
        scheme: &str,
    ) -> Result<String> {
        self.core
            .base_url_for_container(container_id, internal_port, scheme)
            .await
    }

    /// The host-side binding of a published port, or `None` when the port
    /// is not published at all.
    pub async fn port_bindings(
        &self,
        container_id: &str,
        internal_port: u16,
    ) -> Result<Option<(String, u16)>> {
        self.core.port_bindings(container_id, internal_port).await
    }

    /// The container's IP address on the engine's default bridge network.
    ///
    /// Prefer [`connectable_host_and_port`](Self::connectable_host_and_port)
    /// for connecting from test code.
    pub async fn resolve_bridge_ip(&self, designation: &str) -> Result<String> {
        self.core.resolve_bridge_ip(designation).await
    }

    /// The container's IP address on the run's isolated network.
    pub async fn resolve_isolated_network_ip(&self, designation: &str) -> Result<String> {
        self.core.resolve_isolated_network_ip(designation).await
    }

    /// The network-state subset of the container's inspect data.
    pub async fn network_info(&self, designation: &str) -> Result<ContainerNetworkInfo> {
        self.core.network_info(designation).await
    }
}

impl RigCore {
    fn container_name(&self, service_name: &str) -> String {
        format!("{}_{}_{}", self.config.basename, service_name, self.run_id)
    }

    fn alias_set(&self, spec: &LaunchSpec) -> Vec<String> {
        let mut bare: BTreeSet<&str> = BTreeSet::new();
        bare.insert(spec.service_name.as_str());
        bare.extend(spec.aliases.iter().map(String::as_str));

        let mut aliases = Vec::new();
        for alias in bare {
            aliases.push(alias.to_string());
            if let Some(domain) = &self.config.virtual_domain {
                aliases.push(format!("{alias}.{domain}"));
            }
        }
        aliases
    }

    async fn launch(&self, spec: LaunchSpec) -> Result<String> {
        let image = spec.resolve_image()?;
        let image = match &spec.registry {
            Some(logical_name) => image.qualify(self.registries.lookup_by_name(logical_name)?)?,
            None => image,
        };
        let image = image.or_default_tag(&self.config.default_tag);

        let container_name = self.container_name(&spec.service_name);

        // Idempotent cleanup of leftovers from a previous aborted run.
        for stale in self.engine.list_containers_by_name(&container_name).await? {
            warn!(container = %stale, name = %container_name, "removing stale container");
            self.engine.remove_container(&stale, true).await?;
        }

        self.pull_if_needed(&image, spec.force_pull).await?;

        let env = spec
            .environment
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let engine_spec = EngineContainerSpec {
            name: container_name.clone(),
            hostname: spec.service_name.clone(),
            image: image.full_name(),
            env,
            command: spec.command.clone(),
            port_bindings: spec.ports.bindings(),
            publish_all_ports: true,
        };

        let container_id = self.engine.create_container(&engine_spec).await?;

        // Registered before attach/start, so a failure below still leaves
        // the container to remove_all instead of leaking it.
        {
            let mut state = self.state.write().await;
            state.owned.insert(
                container_id.clone(),
                OwnedContainer {
                    name: container_name.clone(),
                },
            );
            state
                .services
                .insert(container_id.clone(), spec.service_name.clone());
        }

        for mount in &spec.mounts {
            let (data, target_dir) = mount.pack()?;
            self.engine
                .upload_archive(&container_id, &target_dir, data)
                .await?;
        }

        let aliases = self.alias_set(&spec);
        self.engine
            .connect_network(&self.network_id, &container_id, &aliases)
            .await?;
        self.engine.start_container(&container_id).await?;

        info!(
            service = %spec.service_name,
            container = %container_name,
            id = %container_id,
            aliases = ?aliases,
            "launched container"
        );

        Ok(container_id)
    }

    async fn pull_if_needed(&self, image: &DockerImage, force_pull: bool) -> Result<()> {
        if image.use_local() || !(self.config.update_images || force_pull) {
            return Ok(());
        }

        // Deduplicated on the full tagged reference, so the same name under
        // a different tag still pulls.
        if self.state.read().await.pulled_images.contains(image) {
            return Ok(());
        }

        let Some(tag) = image.tag() else {
            return Ok(());
        };

        let auth = image
            .registry()
            .and_then(|host| self.registries.lookup_by_host(host))
            .and_then(|entry| {
                entry.credentials().map(|credentials| PullAuth {
                    username: credentials.username.clone(),
                    password: credentials.password.clone(),
                    server_address: entry.registry_host().map(str::to_string),
                })
            });

        self.engine
            .pull_image(&image.tagless_name(), tag, auth)
            .await?;

        self.state.write().await.pulled_images.insert(image.clone());
        Ok(())
    }

    async fn require_owned(&self, container_id: &str) -> Result<()> {
        if self.state.read().await.owned.contains_key(container_id) {
            Ok(())
        } else {
            Err(RigError::unknown_container(container_id))
        }
    }

    pub(crate) async fn find_id(&self, designation: &str) -> Result<String> {
        let state = self.state.read().await;
        if state.owned.contains_key(designation) {
            return Ok(designation.to_string());
        }
        for (container_id, service) in &state.services {
            if service == designation {
                return Ok(container_id.clone());
            }
        }
        Err(RigError::unknown_service(designation))
    }

    pub(crate) async fn service_name(&self, container_id: &str) -> Result<String> {
        self.state
            .read()
            .await
            .services
            .get(container_id)
            .cloned()
            .ok_or_else(|| RigError::unknown_container(container_id))
    }

    pub(crate) async fn owned_container_ids(&self) -> Vec<String> {
        self.state.read().await.owned.keys().cloned().collect()
    }

    pub(crate) async fn remove(&self, container_id: &str) -> Result<()> {
        self.require_owned(container_id).await?;
        self.engine.remove_container(container_id, true).await?;

        // Both maps drop the entry under one write lock, so an observer
        // sees either the old or the fully-removed state.
        let mut state = self.state.write().await;
        state.owned.remove(container_id);
        state.services.remove(container_id);

        info!(container = %container_id, "removed container");
        Ok(())
    }

    pub(crate) async fn remove_all(&self) -> Result<()> {
        let ids = self.owned_container_ids().await;

        for container_id in ids {
            if let Err(e) = self.engine.remove_container(&container_id, true).await {
                warn!(container = %container_id, error = %e, "failed to remove container");
            } else {
                info!(container = %container_id, "removed container");
            }

            // The bookkeeping is dropped either way; this is terminal
            // teardown and nothing may linger in the registry.
            let mut state = self.state.write().await;
            state.owned.remove(&container_id);
            state.services.remove(&container_id);
        }

        info!(network = %self.network_name, id = %self.network_id, "removing network");
        self.engine.remove_network(&self.network_id).await?;
        Ok(())
    }

    pub(crate) async fn stop_container(&self, designation: &str, timeout_secs: u32) -> Result<()> {
        let container_id = self.find_id(designation).await?;
        self.engine.stop_container(&container_id, timeout_secs).await
    }

    pub(crate) async fn start_container(&self, designation: &str) -> Result<()> {
        let container_id = self.find_id(designation).await?;
        self.engine.start_container(&container_id).await
    }

    pub(crate) async fn container_logs(&self, container_id: &str) -> Result<String> {
        self.require_owned(container_id).await?;
        let raw = self.engine.container_logs(container_id).await?;
        Ok(String::from_utf8_lossy(&raw).trim().to_string())
    }

    pub(crate) async fn dump_logs_to_stdout(
        &self,
        container_id: &str,
        options: DumpOptions,
    ) -> Result<()> {
        let service = self.service_name(container_id).await?;

        if options.only_once && self.state.read().await.logs_dumped.contains(container_id) {
            return Ok(());
        }

        let logs = self.container_logs(container_id).await?;
        let banner = "=".repeat(30);

        println!();
        println!("{banner} Started {service} {banner}");
        for line in logs.lines() {
            let line = line.trim_end();
            if line.is_empty() && options.suppress_empty_lines {
                continue;
            }
            println!("[dockerlog:{service}] {line}");
        }
        println!("{banner} Closed {service} {banner}");

        self.state
            .write()
            .await
            .logs_dumped
            .insert(container_id.to_string());
        Ok(())
    }

    pub(crate) async fn network_info(&self, designation: &str) -> Result<ContainerNetworkInfo> {
        let container_id = self.find_id(designation).await?;
        self.engine.network_info(&container_id).await
    }

    pub(crate) async fn resolve_bridge_ip(&self, designation: &str) -> Result<String> {
        let container_id = self.find_id(designation).await?;
        let info = self.engine.network_info(&container_id).await?;
        info.bridge_ip
            .ok_or_else(|| RigError::no_network_address(container_id, "bridge"))
    }

    pub(crate) async fn resolve_isolated_network_ip(&self, designation: &str) -> Result<String> {
        let container_id = self.find_id(designation).await?;
        let info = self.engine.network_info(&container_id).await?;
        info.network_ips
            .get(&self.network_name)
            .cloned()
            .ok_or_else(|| RigError::no_network_address(container_id, &self.network_name))
    }

    /// Finds a host/port the test process can open a socket to.
    ///
    /// Tries the cheapest paths first: the container's default-bridge IP if
    /// the routing table can route there, then its isolated-network IP, and
    /// only then the published host-side binding. A missing routing table
    /// optimistically assumes the bridge IP is directly reachable. The
    /// escape-hatch marker skips straight to the published binding.
    pub(crate) async fn connectable_host_and_port(
        &self,
        container_id: &str,
        internal_port: u16,
    ) -> Result<(String, u16)> {
        if self.config.bypass_marker_present() {
            info!("internal routing bypassed, using external routing");
            return self.published_host_and_port(container_id, internal_port).await;
        }

        self.require_owned(container_id).await?;
        let info = self.engine.network_info(container_id).await?;
        let table = RoutingTable::capture();

        if let Some(host) = select_internal_route(&table, &info, &self.network_name) {
            return Ok((host, internal_port));
        }

        let (host, port) = self.published_host_and_port(container_id, internal_port).await?;
        info!(
            external = %format!("{host}:{port}"),
            port = internal_port,
            "no internal route, using published binding"
        );
        Ok((host, port))
    }

    async fn published_host_and_port(
        &self,
        container_id: &str,
        internal_port: u16,
    ) -> Result<(String, u16)> {
        self.port_bindings(container_id, internal_port)
            .await?
            .ok_or_else(|| RigError::PortNotPublished {
                container_id: container_id.to_string(),
                port: internal_port,
            })
    }

    pub(crate) async fn port_bindings(
        &self,
        container_id: &str,
        internal_port: u16,
    ) -> Result<Option<(String, u16)>> {
        let Some(bindings) = self.bound_ports(container_id, internal_port).await? else {
            return Ok(None);
        };

        let binding = select_host_binding(&bindings, &self.config.docker_host, container_id)?;
        Ok(Some(binding))
    }

    pub(crate) async fn base_url_for_container(
        &self,
        container_id: &str,
        internal_port: u16,
        scheme: &str,
    ) -> Result<String> {
        self.require_owned(container_id).await?;
        let (host, port) = self
            .connectable_host_and_port(container_id, internal_port)
            .await?;
        Ok(format!("{scheme}://{host}:{port}"))
    }

    /// Polls the engine for the bindings of `internal_port/tcp`.
    ///
    /// Right after container start the engine may transiently report an
    /// empty binding list; that is retried up to [`BOUND_PORTS_TIMEOUT`].
    /// An absent binding key means the port is not published at all and is
    /// reported immediately as `Ok(None)`, distinct from a timeout.
    async fn bound_ports(
        &self,
        container_id: &str,
        internal_port: u16,
    ) -> Result<Option<Vec<HostBinding>>> {
        self.require_owned(container_id).await?;

        let started = Instant::now();
        loop {
            let info = self.engine.network_info(container_id).await?;
            match info.tcp_bindings(internal_port) {
                None => return Ok(None),
                Some(bindings) if !bindings.is_empty() => return Ok(Some(bindings.to_vec())),
                Some(_) => {
                    if started.elapsed() >= BOUND_PORTS_TIMEOUT {
                        return Err(RigError::PortBindingTimeout {
                            container_id: container_id.to_string(),
                            port: internal_port,
                            waited: started.elapsed(),
                        });
                    }
                    tokio::time::sleep(BOUND_PORTS_POLL_INTERVAL).await;
                }
            }
        }
    }
}

/// Picks a directly-routable internal address for a container, if any.
///
/// The default-bridge address is preferred over the isolated-network
/// address. A missing routing table optimistically selects the bridge IP.
/// `None` means no internal route exists and the caller should fall back to
/// the published host-side binding.
fn select_internal_route(
    table: &Option<RoutingTable>,
    info: &ContainerNetworkInfo,
    network_name: &str,
) -> Option<String> {
    let Some(table) = table else {
        let bridge_ip = info.bridge_ip.as_ref()?;
        info!(
            host = %bridge_ip,
            "cannot determine routing table, assuming internal route is usable"
        );
        return Some(bridge_ip.clone());
    };

    if let Some(bridge_ip) = &info.bridge_ip {
        if let Ok(addr) = bridge_ip.parse::<IpAddr>() {
            if let Some(entry) = table.find_route(addr) {
                debug!(
                    network = ?entry.network,
                    interface = %entry.interface,
                    host = %bridge_ip,
                    "default bridge network is directly routable"
                );
                return Some(bridge_ip.clone());
            }
        }
    }

    if let Some(isolated_ip) = info.network_ips.get(network_name) {
        if let Ok(addr) = isolated_ip.parse::<IpAddr>() {
            if let Some(entry) = table.find_route(addr) {
                debug!(
                    network = ?entry.network,
                    interface = %entry.interface,
                    host = %isolated_ip,
                    "isolated network is directly routable"
                );
                return Some(isolated_ip.clone());
            }
        }
    }

    None
}

/// Picks the connectable host/port from a binding list.
///
/// A wildcard or empty host IP is replaced with the configured daemon host
/// label. A `localhost` binding is rejected when the daemon host is not
/// itself `localhost`: that combination is unreachable from the test
/// process.
fn select_host_binding(
    bindings: &[HostBinding],
    docker_host: &str,
    container_id: &str,
) -> Result<(String, u16)> {
    let first = &bindings[0];

    let host = if first.host_ip.is_empty() || first.host_ip == "0.0.0.0" {
        docker_host.to_string()
    } else if first.host_ip == "localhost" && docker_host != "localhost" {
        return Err(RigError::UnreachableBinding {
            bound_host: first.host_ip.clone(),
            docker_host: docker_host.to_string(),
        });
    } else {
        first.host_ip.clone()
    };

    let port = first
        .host_port
        .parse::<u16>()
        .map_err(|_| RigError::MalformedBinding {
            container_id: container_id.to_string(),
            value: first.host_port.clone(),
        })?;

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Little-endian hex rows: a default route, 172.17.0.0/16 via docker0
    // and 172.30.0.0/16 via br-rig.
    const ROUTES: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
docker0\t000011AC\t00000000\t0001\t0\t0\t0\t0000FFFF\t0\t0\t0
br-rig\t00001EAC\t00000000\t0001\t0\t0\t0\t0000FFFF\t0\t0\t0
";

    fn routes() -> Option<RoutingTable> {
        Some(RoutingTable::parse(ROUTES).unwrap())
    }

    fn network_info(bridge_ip: Option<&str>, isolated_ip: Option<&str>) -> ContainerNetworkInfo {
        let mut info = ContainerNetworkInfo::default();
        info.bridge_ip = bridge_ip.map(str::to_string);
        if let Some(ip) = isolated_ip {
            info.network_ips
                .insert("rigtest-defaultnet-1".to_string(), ip.to_string());
        }
        info
    }

    #[test]
    fn test_routable_bridge_ip_is_used_directly() {
        let info = network_info(Some("172.17.0.2"), Some("172.30.0.5"));
        let route = select_internal_route(&routes(), &info, "rigtest-defaultnet-1");
        assert_eq!(route.as_deref(), Some("172.17.0.2"));
    }

    #[test]
    fn test_unroutable_bridge_falls_back_to_isolated_network_ip() {
        // 10.x is outside every table entry, the isolated address is not.
        let info = network_info(Some("10.99.0.2"), Some("172.30.0.5"));
        let route = select_internal_route(&routes(), &info, "rigtest-defaultnet-1");
        assert_eq!(route.as_deref(), Some("172.30.0.5"));

        // An isolated address on some other network name does not count.
        let route = select_internal_route(&routes(), &info, "another-net");
        assert_eq!(route, None);
    }

    #[test]
    fn test_missing_routing_table_assumes_bridge_is_reachable() {
        let info = network_info(Some("172.17.0.2"), None);
        let route = select_internal_route(&None, &info, "rigtest-defaultnet-1");
        assert_eq!(route.as_deref(), Some("172.17.0.2"));

        // Without a bridge address there is nothing to assume.
        let info = network_info(None, Some("172.30.0.5"));
        assert_eq!(select_internal_route(&None, &info, "rigtest-defaultnet-1"), None);
    }

    #[test]
    fn test_no_internal_route_defers_to_published_binding() {
        let info = network_info(Some("10.99.0.2"), Some("10.88.0.5"));
        assert_eq!(
            select_internal_route(&routes(), &info, "rigtest-defaultnet-1"),
            None
        );

        let info = network_info(None, None);
        assert_eq!(
            select_internal_route(&routes(), &info, "rigtest-defaultnet-1"),
            None
        );
    }

    fn binding(host_ip: &str, host_port: &str) -> HostBinding {
        HostBinding {
            host_ip: host_ip.to_string(),
            host_port: host_port.to_string(),
        }
    }

    #[test]
    fn test_select_binding_substitutes_wildcard_host() {
        let bindings = vec![binding("0.0.0.0", "32768")];
        let resolved = select_host_binding(&bindings, "dockerbox", "c1").unwrap();
        assert_eq!(resolved, ("dockerbox".to_string(), 32768));

        let bindings = vec![binding("", "32768")];
        let resolved = select_host_binding(&bindings, "dockerbox", "c1").unwrap();
        assert_eq!(resolved, ("dockerbox".to_string(), 32768));
    }

    #[test]
    fn test_select_binding_keeps_concrete_host() {
        let bindings = vec![binding("192.168.1.10", "15432")];
        let resolved = select_host_binding(&bindings, "dockerbox", "c1").unwrap();
        assert_eq!(resolved, ("192.168.1.10".to_string(), 15432));
    }

    #[test]
    fn test_select_binding_rejects_foreign_localhost() {
        let bindings = vec![binding("localhost", "32768")];
        let err = select_host_binding(&bindings, "remote-ci", "c1").unwrap_err();
        assert!(matches!(err, RigError::UnreachableBinding { .. }));

        // localhost on localhost is fine.
        let resolved = select_host_binding(&bindings, "localhost", "c1").unwrap();
        assert_eq!(resolved, ("localhost".to_string(), 32768));
    }

    #[test]
    fn test_select_binding_rejects_garbage_port() {
        let bindings = vec![binding("0.0.0.0", "not-a-port")];
        let err = select_host_binding(&bindings, "localhost", "c1").unwrap_err();
        assert!(matches!(err, RigError::MalformedBinding { .. }));
    }
}
