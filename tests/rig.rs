//! Rig lifecycle tests against a scripted in-memory engine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dockrig::engine::{
    ContainerEngine, ContainerNetworkInfo, EngineContainerSpec, HostBinding, HostPortSpec, PullAuth,
};
use dockrig::{DockerRig, DumpOptions, LaunchSpec, RegistryDirectory, RegistryEntry, Result, RigConfig, RigError};

#[derive(Debug, Clone)]
struct FakeContainer {
    spec: EngineContainerSpec,
    running: bool,
}

#[derive(Default)]
struct FakeState {
    next_id: u32,
    networks: HashMap<String, String>,
    removed_networks: Vec<String>,
    containers: HashMap<String, FakeContainer>,
    removed_containers: Vec<String>,
    stale_by_name: HashMap<String, Vec<String>>,
    pulls: Vec<(String, String, bool)>,
    aliases: HashMap<String, Vec<String>>,
    network_infos: HashMap<String, ContainerNetworkInfo>,
    empty_polls_remaining: HashMap<String, u32>,
    logs: HashMap<String, Vec<u8>>,
    uploads: Vec<(String, String)>,
    fail_remove: Vec<String>,
    fail_network_removal: bool,
}

#[derive(Default)]
struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn seed_stale(&self, name: &str, id: &str) {
        self.lock()
            .stale_by_name
            .entry(name.to_string())
            .or_default()
            .push(id.to_string());
    }

    fn set_network_info(&self, id: &str, info: ContainerNetworkInfo) {
        self.lock().network_infos.insert(id.to_string(), info);
    }

    fn set_empty_polls(&self, id: &str, polls: u32) {
        self.lock()
            .empty_polls_remaining
            .insert(id.to_string(), polls);
    }

    fn set_logs(&self, id: &str, logs: &str) {
        self.lock().logs.insert(id.to_string(), logs.as_bytes().to_vec());
    }

    fn fail_remove(&self, id: &str) {
        self.lock().fail_remove.push(id.to_string());
    }

    fn fail_network_removal(&self) {
        self.lock().fail_network_removal = true;
    }

    fn pulls(&self) -> Vec<(String, String, bool)> {
        self.lock().pulls.clone()
    }

    fn aliases_for(&self, id: &str) -> Vec<String> {
        self.lock().aliases.get(id).cloned().unwrap_or_default()
    }

    fn spec_for(&self, id: &str) -> EngineContainerSpec {
        self.lock().containers[id].spec.clone()
    }

    fn removed_containers(&self) -> Vec<String> {
        self.lock().removed_containers.clone()
    }

    fn removed_networks(&self) -> Vec<String> {
        self.lock().removed_networks.clone()
    }

    fn uploads(&self) -> Vec<(String, String)> {
        self.lock().uploads.clone()
    }

    fn is_running(&self, id: &str) -> bool {
        self.lock().containers[id].running
    }
}

fn engine_error(message: &str) -> RigError {
    RigError::Io(std::io::Error::other(message.to_string()))
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<String> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("net-{}", state.next_id);
        state.networks.insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_network_removal {
            return Err(engine_error("network removal refused"));
        }
        state.networks.remove(id);
        state.removed_networks.push(id.to_string());
        Ok(())
    }

    async fn list_containers_by_name(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .stale_by_name
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_container(&self, spec: &EngineContainerSpec) -> Result<String> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("ctr-{}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn connect_network(
        &self,
        _network_id: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<()> {
        self.lock()
            .aliases
            .insert(container_id.to_string(), aliases.to_vec());
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| engine_error("no such container"))?;
        container.running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout_secs: u32) -> Result<()> {
        let mut state = self.lock();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| engine_error("no such container"))?;
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<()> {
        let mut state = self.lock();
        if state.fail_remove.iter().any(|f| f == id) {
            return Err(engine_error("removal refused"));
        }
        state.containers.remove(id);
        for stale in state.stale_by_name.values_mut() {
            stale.retain(|s| s != id);
        }
        state.removed_containers.push(id.to_string());
        Ok(())
    }

    async fn container_logs(&self, id: &str) -> Result<Vec<u8>> {
        Ok(self.lock().logs.get(id).cloned().unwrap_or_default())
    }

    async fn network_info(&self, id: &str) -> Result<ContainerNetworkInfo> {
        let mut state = self.lock();
        let mut info = state.network_infos.get(id).cloned().unwrap_or_default();

        if let Some(remaining) = state.empty_polls_remaining.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                for bindings in info.ports.values_mut() {
                    bindings.clear();
                }
            }
        }

        Ok(info)
    }

    async fn pull_image(&self, image: &str, tag: &str, auth: Option<PullAuth>) -> Result<()> {
        self.lock()
            .pulls
            .push((image.to_string(), tag.to_string(), auth.is_some()));
        Ok(())
    }

    async fn upload_archive(&self, id: &str, target_dir: &Path, _data: Vec<u8>) -> Result<()> {
        self.lock()
            .uploads
            .push((id.to_string(), target_dir.display().to_string()));
        Ok(())
    }
}

fn test_config() -> RigConfig {
    RigConfig::builder()
        .basename("rigtest")
        .docker_host("dockerbox")
        .build()
}

fn published(port: u16, host_ip: &str, host_port: &str) -> ContainerNetworkInfo {
    let mut info = ContainerNetworkInfo::default();
    info.ports.insert(
        format!("{port}/tcp"),
        vec![HostBinding {
            host_ip: host_ip.to_string(),
            host_port: host_port.to_string(),
        }],
    );
    info
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn rig_with(engine: Arc<FakeEngine>, config: RigConfig) -> DockerRig {
    init_tracing();
    DockerRig::with_engine(engine, config, RegistryDirectory::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_fresh_rig_creates_isolated_network_and_owns_nothing() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    assert!(rig.owned_container_ids().await.is_empty());
    assert_eq!(rig.network_name(), format!("rigtest-defaultnet-{}", rig.run_id()));

    let state = engine.lock();
    assert_eq!(state.networks.len(), 1);
    assert!(state.networks.values().any(|n| n == rig.network_name()));
}

#[tokio::test]
async fn test_launch_registers_container_under_run_scoped_name() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let handle = rig
        .launch(
            LaunchSpec::new("postgres", "postgres:16")
                .env("POSTGRES_PASSWORD", "secret")
                .expose(5432),
        )
        .await
        .unwrap();

    let spec = engine.spec_for(handle.id());
    assert_eq!(spec.name, format!("rigtest_postgres_{}", rig.run_id()));
    assert_eq!(spec.hostname, "postgres");
    assert_eq!(spec.image, "postgres:16");
    assert!(spec.env.contains(&"POSTGRES_PASSWORD=secret".to_string()));
    assert_eq!(spec.port_bindings, vec![(5432, HostPortSpec::default())]);
    assert!(spec.publish_all_ports);
    assert!(engine.is_running(handle.id()));

    assert_eq!(rig.owned_container_ids().await, vec![handle.id().to_string()]);
    assert_eq!(handle.service_name().await.unwrap(), "postgres");
    assert_eq!(rig.find_id("postgres").await.unwrap(), handle.id());
    assert_eq!(rig.find_id(handle.id()).await.unwrap(), handle.id());
}

#[tokio::test]
async fn test_launch_attaches_aliases_with_virtual_domain() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let handle = rig
        .launch(LaunchSpec::new("kafka", "kafka:3").alias("broker"))
        .await
        .unwrap();

    let mut aliases = engine.aliases_for(handle.id());
    aliases.sort();
    assert_eq!(
        aliases,
        vec!["broker", "broker.test.loc", "kafka", "kafka.test.loc"]
    );
}

#[tokio::test]
async fn test_launch_without_virtual_domain_uses_bare_aliases() {
    let engine = FakeEngine::new();
    let config = RigConfig::builder().basename("rigtest").no_virtual_domain().build();
    let rig = rig_with(engine.clone(), config).await;

    let handle = rig.launch(LaunchSpec::new("kafka", "kafka:3")).await.unwrap();
    assert_eq!(engine.aliases_for(handle.id()), vec!["kafka"]);
}

#[tokio::test]
async fn test_launch_force_removes_stale_namesakes() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let name = format!("rigtest_redis_{}", rig.run_id());
    engine.seed_stale(&name, "stale-1");
    engine.seed_stale(&name, "stale-2");

    rig.launch(LaunchSpec::new("redis", "redis:7")).await.unwrap();

    let removed = engine.removed_containers();
    assert!(removed.contains(&"stale-1".to_string()));
    assert!(removed.contains(&"stale-2".to_string()));
}

#[tokio::test]
async fn test_images_pull_once_per_distinct_reference() {
    let engine = FakeEngine::new();
    let config = RigConfig::builder()
        .basename("rigtest")
        .update_images(true)
        .build();
    let rig = rig_with(engine.clone(), config).await;

    rig.launch(LaunchSpec::new("one", "redis:7")).await.unwrap();
    rig.launch(LaunchSpec::new("two", "redis:7")).await.unwrap();
    rig.launch(LaunchSpec::new("three", "redis:6")).await.unwrap();

    let pulls = engine.pulls();
    assert_eq!(
        pulls,
        vec![
            ("redis".to_string(), "7".to_string(), false),
            ("redis".to_string(), "6".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn test_untagged_image_pulls_with_default_tag() {
    let engine = FakeEngine::new();
    let config = RigConfig::builder()
        .basename("rigtest")
        .default_tag("stable")
        .update_images(true)
        .build();
    let rig = rig_with(engine.clone(), config).await;

    let handle = rig.launch(LaunchSpec::new("app", "myapp")).await.unwrap();

    assert_eq!(engine.pulls(), vec![("myapp".to_string(), "stable".to_string(), false)]);
    assert_eq!(engine.spec_for(handle.id()).image, "myapp:stable");
}

#[tokio::test]
async fn test_force_pull_overrides_update_images_off() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    rig.launch(LaunchSpec::new("quiet", "redis:7")).await.unwrap();
    assert!(engine.pulls().is_empty());

    rig.launch(LaunchSpec::new("eager", "redis:7").force_pull(true))
        .await
        .unwrap();
    assert_eq!(engine.pulls().len(), 1);
}

#[tokio::test]
async fn test_registry_qualification_supplies_pull_credentials() {
    let engine = FakeEngine::new();
    let mut registries = RegistryDirectory::new();
    registries
        .register(
            RegistryEntry::new("nexus")
                .with_registry_host("superreg:9000")
                .with_default_tag("stable")
                .with_credentials("user", "hunter2"),
        )
        .unwrap();

    let config = RigConfig::builder()
        .basename("rigtest")
        .update_images(true)
        .build();
    let rig = DockerRig::with_engine(engine.clone(), config, registries)
        .await
        .unwrap();

    let handle = rig
        .launch(LaunchSpec::new("app", "myapp").registry("nexus"))
        .await
        .unwrap();

    assert_eq!(engine.spec_for(handle.id()).image, "superreg:9000/myapp:stable");
    assert_eq!(
        engine.pulls(),
        vec![("superreg:9000/myapp".to_string(), "stable".to_string(), true)]
    );
}

#[tokio::test]
async fn test_unknown_registry_name_fails_before_engine_calls() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let err = rig
        .launch(LaunchSpec::new("app", "myapp").registry("missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(engine.lock().containers.is_empty());
}

#[tokio::test]
async fn test_host_interface_binding_reaches_the_engine() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let handle = rig
        .launch(LaunchSpec::new("pg", "postgres:16").publish_on(5432, "127.0.0.1", 15432))
        .await
        .unwrap();

    assert_eq!(
        engine.spec_for(handle.id()).port_bindings,
        vec![(5432, HostPortSpec::on_ip("127.0.0.1", 15432))]
    );
}

#[tokio::test]
async fn test_missing_network_address_is_reported_as_such() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let handle = rig.launch(LaunchSpec::new("pg", "postgres:16")).await.unwrap();
    engine.set_network_info(handle.id(), ContainerNetworkInfo::default());

    let err = rig.resolve_bridge_ip(handle.id()).await.unwrap_err();
    assert!(matches!(err, RigError::NoNetworkAddress { .. }));

    let err = rig.resolve_isolated_network_ip("pg").await.unwrap_err();
    match err {
        RigError::NoNetworkAddress { network, .. } => assert_eq!(network, rig.network_name()),
        other => panic!("expected NoNetworkAddress, got {other:?}"),
    }

    // An unknown designation is still an unknown container, not a missing
    // address.
    assert!(rig.resolve_bridge_ip("nothere").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_mounts_upload_into_target_parent() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("app.conf");
    std::fs::write(&source, "listen 8080\n").unwrap();

    let handle = rig
        .launch(LaunchSpec::new("app", "myapp:1").mount(&source, "/etc/app/app.conf"))
        .await
        .unwrap();

    assert_eq!(
        engine.uploads(),
        vec![(handle.id().to_string(), "/etc/app".to_string())]
    );
}

#[tokio::test]
async fn test_remove_forgets_container_and_second_remove_fails() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let handle = rig.launch(LaunchSpec::new("redis", "redis:7")).await.unwrap();
    rig.remove(handle.id()).await.unwrap();

    assert!(rig.owned_container_ids().await.is_empty());
    assert!(matches!(
        rig.remove(handle.id()).await.unwrap_err(),
        RigError::UnknownContainer(_)
    ));
    assert!(matches!(
        handle.logs().await.unwrap_err(),
        RigError::UnknownContainer(_)
    ));
}

#[tokio::test]
async fn test_remove_all_survives_individual_removal_failure() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let a = rig.launch(LaunchSpec::new("a", "img:1")).await.unwrap();
    let b = rig.launch(LaunchSpec::new("b", "img:1")).await.unwrap();
    let c = rig.launch(LaunchSpec::new("c", "img:1")).await.unwrap();
    engine.fail_remove(b.id());

    rig.remove_all().await.unwrap();

    let removed = engine.removed_containers();
    assert!(removed.contains(&a.id().to_string()));
    assert!(removed.contains(&c.id().to_string()));
    assert!(!removed.contains(&b.id().to_string()));

    // The registry is empty even for the container the engine refused to
    // remove, and the network is gone.
    assert!(rig.owned_container_ids().await.is_empty());
    assert_eq!(engine.removed_networks().len(), 1);
}

#[tokio::test]
async fn test_remove_all_propagates_network_removal_failure() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    rig.launch(LaunchSpec::new("a", "img:1")).await.unwrap();
    engine.fail_network_removal();

    assert!(rig.remove_all().await.is_err());
    assert!(rig.owned_container_ids().await.is_empty());
}

#[tokio::test]
async fn test_handle_outliving_rig_reports_rig_gone() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;
    let handle = rig.launch(LaunchSpec::new("redis", "redis:7")).await.unwrap();

    drop(rig);

    assert!(matches!(
        handle.service_name().await.unwrap_err(),
        RigError::RigGone
    ));
    assert!(matches!(
        handle.connectable_host_and_port(6379).await.unwrap_err(),
        RigError::RigGone
    ));
}

#[tokio::test]
async fn test_stop_and_start_resolve_service_names() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;
    let handle = rig.launch(LaunchSpec::new("redis", "redis:7")).await.unwrap();

    rig.stop_container("redis", 10).await.unwrap();
    assert!(!engine.is_running(handle.id()));

    rig.start_container("redis").await.unwrap();
    assert!(engine.is_running(handle.id()));

    assert!(rig.stop_container("nothere", 10).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_wildcard_binding_resolves_to_docker_host() {
    let engine = FakeEngine::new();
    let config = RigConfig::builder()
        .basename("rigtest")
        .docker_host("dockerbox")
        .bypass_internal_routing(true)
        .build();
    let rig = rig_with(engine.clone(), config).await;

    let handle = rig.launch(LaunchSpec::new("pg", "postgres:16").expose(5432)).await.unwrap();
    engine.set_network_info(handle.id(), published(5432, "0.0.0.0", "32768"));

    let (host, port) = handle.connectable_host_and_port(5432).await.unwrap();
    assert_eq!((host.as_str(), port), ("dockerbox", 32768));

    let url = handle.base_url(5432, "http").await.unwrap();
    assert_eq!(url, "http://dockerbox:32768");
}

#[tokio::test]
async fn test_localhost_binding_on_remote_daemon_is_unreachable() {
    let engine = FakeEngine::new();
    let config = RigConfig::builder()
        .basename("rigtest")
        .docker_host("remote-ci")
        .bypass_internal_routing(true)
        .build();
    let rig = rig_with(engine.clone(), config).await;

    let handle = rig.launch(LaunchSpec::new("pg", "postgres:16").expose(5432)).await.unwrap();
    engine.set_network_info(handle.id(), published(5432, "localhost", "32768"));

    let err = handle.connectable_host_and_port(5432).await.unwrap_err();
    assert!(matches!(err, RigError::UnreachableBinding { .. }));
}

#[tokio::test]
async fn test_unpublished_port_is_reported_immediately() {
    let engine = FakeEngine::new();
    let config = RigConfig::builder()
        .basename("rigtest")
        .bypass_internal_routing(true)
        .build();
    let rig = rig_with(engine.clone(), config).await;

    let handle = rig.launch(LaunchSpec::new("pg", "postgres:16")).await.unwrap();
    engine.set_network_info(handle.id(), ContainerNetworkInfo::default());

    // Absent binding key: not published, no polling.
    assert_eq!(handle.port_bindings(5432).await.unwrap(), None);

    let err = handle.connectable_host_and_port(5432).await.unwrap_err();
    assert!(matches!(err, RigError::PortNotPublished { port: 5432, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_binding_poll_retries_transiently_empty_list() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let handle = rig.launch(LaunchSpec::new("pg", "postgres:16").expose(5432)).await.unwrap();
    engine.set_network_info(handle.id(), published(5432, "0.0.0.0", "32768"));
    engine.set_empty_polls(handle.id(), 3);

    let resolved = handle.port_bindings(5432).await.unwrap();
    assert_eq!(resolved, Some(("dockerbox".to_string(), 32768)));
}

#[tokio::test(start_paused = true)]
async fn test_binding_poll_times_out_on_persistently_empty_list() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let handle = rig.launch(LaunchSpec::new("pg", "postgres:16").expose(5432)).await.unwrap();
    engine.set_network_info(handle.id(), published(5432, "0.0.0.0", "32768"));
    engine.set_empty_polls(handle.id(), u32::MAX);

    let err = handle.port_bindings(5432).await.unwrap_err();
    assert!(matches!(err, RigError::PortBindingTimeout { port: 5432, .. }));
}

#[tokio::test]
async fn test_logs_are_decoded_and_trimmed() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let handle = rig.launch(LaunchSpec::new("app", "myapp:1")).await.unwrap();
    engine.set_logs(handle.id(), "\nready to accept connections\n\n");

    assert_eq!(handle.logs().await.unwrap(), "ready to accept connections");
}

#[tokio::test]
async fn test_dump_logs_only_once_by_default() {
    let engine = FakeEngine::new();
    let rig = rig_with(engine.clone(), test_config()).await;

    let handle = rig.launch(LaunchSpec::new("app", "myapp:1")).await.unwrap();
    engine.set_logs(handle.id(), "line one\nline two\n");

    handle.dump_logs_to_stdout(DumpOptions::default()).await.unwrap();
    handle.dump_logs_to_stdout(DumpOptions::default()).await.unwrap();

    // Repeats are allowed when only_once is off.
    handle
        .dump_logs_to_stdout(DumpOptions {
            only_once: false,
            suppress_empty_lines: true,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_rigs_do_not_share_names_or_networks() {
    let engine = FakeEngine::new();
    let first = rig_with(engine.clone(), test_config()).await;
    let second = rig_with(engine.clone(), test_config()).await;

    assert_ne!(first.run_id(), second.run_id());
    assert_ne!(first.network_name(), second.network_name());

    let a = first.launch(LaunchSpec::new("redis", "redis:7")).await.unwrap();
    let b = second.launch(LaunchSpec::new("redis", "redis:7")).await.unwrap();

    assert_ne!(
        engine.spec_for(a.id()).name,
        engine.spec_for(b.id()).name
    );
}
