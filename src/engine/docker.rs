//! Docker implementation of the engine boundary, via bollard.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions};
use bollard::service::{EndpointSettings, HostConfig, PortBinding};
use bollard::{ClientVersion, Docker};
use futures::StreamExt;
use tracing::{debug, info};

use crate::engine::{ContainerEngine, ContainerNetworkInfo, EngineContainerSpec, HostBinding, PullAuth};
use crate::error::{Result, RigError};

const DOCKER_SOCKET: &str = "unix:///var/run/docker.sock";
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// A [`ContainerEngine`] backed by the Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects to the local Docker daemon, optionally pinning the API
    /// version, and verifies the connection with a ping.
    pub async fn connect(api_version: Option<(usize, usize)>) -> Result<Self> {
        let docker = match api_version {
            Some((major, minor)) => {
                let version = ClientVersion {
                    major_version: major,
                    minor_version: minor,
                };
                Docker::connect_with_socket(DOCKER_SOCKET, CONNECT_TIMEOUT_SECS, &version)?
            }
            None => Docker::connect_with_local_defaults()?,
        };

        docker.ping().await?;
        info!("connected to Docker daemon");

        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<String> {
        let options = CreateNetworkOptions {
            name,
            driver: "bridge",
            check_duplicate: true,
            ..Default::default()
        };

        let response = self.docker.create_network(options).await?;
        if response.id.is_empty() {
            return Err(RigError::network_creation(name, "no ID returned"));
        }

        info!(network = %name, id = %response.id, "created network");
        Ok(response.id)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        self.docker.remove_network(id).await?;
        Ok(())
    }

    async fn list_containers_by_name(&self, name: &str) -> Result<Vec<String>> {
        let filters: HashMap<String, Vec<String>> =
            [("name".to_string(), vec![name.to_string()])]
                .into_iter()
                .collect();

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries.into_iter().filter_map(|c| c.id).collect())
    }

    async fn create_container(&self, spec: &EngineContainerSpec) -> Result<String> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .port_bindings
            .iter()
            .map(|(port, _)| (format!("{port}/tcp"), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .port_bindings
            .iter()
            .map(|(port, host)| {
                let binding = PortBinding {
                    host_ip: host.ip.clone(),
                    host_port: host.port.map(|p| p.to_string()),
                };
                (format!("{port}/tcp"), Some(vec![binding]))
            })
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            publish_all_ports: Some(spec.publish_all_ports),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            hostname: Some(spec.hostname.clone()),
            env: Some(spec.env.clone()),
            cmd: spec.command.clone(),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        info!(container = %spec.name, id = %response.id, "created container");
        Ok(response.id)
    }

    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<()> {
        let options = ConnectNetworkOptions {
            container: container_id,
            endpoint_config: EndpointSettings {
                aliases: Some(aliases.to_vec()),
                ..Default::default()
            },
        };

        self.docker.connect_network(network_id, options).await?;
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout_secs as i64,
        };
        self.docker.stop_container(id, Some(options)).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }

    async fn container_logs(&self, id: &str) -> Result<Vec<u8>> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut output = Vec::new();

        while let Some(result) = stream.next().await {
            output.extend_from_slice(&result?.into_bytes());
        }

        Ok(output)
    }

    async fn network_info(&self, id: &str) -> Result<ContainerNetworkInfo> {
        let inspect = self.docker.inspect_container(id, None).await?;
        let mut info = ContainerNetworkInfo::default();

        let Some(settings) = inspect.network_settings else {
            return Ok(info);
        };

        info.bridge_ip = settings.ip_address.filter(|ip| !ip.is_empty());

        if let Some(networks) = settings.networks {
            for (name, endpoint) in networks {
                if let Some(ip) = endpoint.ip_address.filter(|ip| !ip.is_empty()) {
                    info.network_ips.insert(name, ip);
                }
            }
        }

        if let Some(ports) = settings.ports {
            for (key, bindings) in ports {
                let bindings = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| HostBinding {
                        host_ip: b.host_ip.unwrap_or_default(),
                        host_port: b.host_port.unwrap_or_default(),
                    })
                    .collect();
                info.ports.insert(key, bindings);
            }
        }

        Ok(info)
    }

    async fn pull_image(&self, image: &str, tag: &str, auth: Option<PullAuth>) -> Result<()> {
        info!(image = %image, tag = %tag, "pulling image");

        let options = CreateImageOptions {
            from_image: image,
            tag,
            ..Default::default()
        };

        let credentials = auth.map(|a| DockerCredentials {
            username: Some(a.username),
            password: Some(a.password),
            serveraddress: a.server_address,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(Some(options), None, credentials);

        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(status = %status, "pull progress");
                    }
                }
                Err(e) => {
                    return Err(RigError::image_pull_failed(
                        format!("{image}:{tag}"),
                        e.to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    async fn upload_archive(&self, id: &str, target_dir: &Path, data: Vec<u8>) -> Result<()> {
        let options = UploadToContainerOptions {
            path: target_dir.to_string_lossy().into_owned(),
            ..Default::default()
        };

        self.docker
            .upload_to_container(id, Some(options), data.into())
            .await?;
        Ok(())
    }
}
