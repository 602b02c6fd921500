//! Launch specifications: image source, ports, environment and mounts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::engine::HostPortSpec;
use crate::error::Result;
use crate::image::DockerImage;

/// The image argument of a launch: either a bare name to be parsed, or an
/// already-structured reference. Normalized to [`DockerImage`] at the launch
/// boundary.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A bare `[registry/]name[:tag]` string.
    Name(String),
    /// A structured reference.
    Reference(DockerImage),
}

impl From<&str> for ImageSource {
    fn from(s: &str) -> Self {
        Self::Name(s.to_string())
    }
}

impl From<String> for ImageSource {
    fn from(s: String) -> Self {
        Self::Name(s)
    }
}

impl From<DockerImage> for ImageSource {
    fn from(image: DockerImage) -> Self {
        Self::Reference(image)
    }
}

/// The ports a container publishes.
///
/// Either an explicit container-port to host-side mapping, or a plain list
/// of container ports each bound to an engine-assigned ephemeral host port.
/// Other shapes are unrepresentable. A [`HostPortSpec`] may pin the host
/// port, the host interface, or both.
#[derive(Debug, Clone, Default)]
pub enum Ports {
    /// No published ports.
    #[default]
    None,
    /// Explicit container-port to host-side mapping.
    Published(Vec<(u16, HostPortSpec)>),
    /// Container ports, each bound to an engine-assigned host port.
    Exposed(Vec<u16>),
}

impl Ports {
    pub(crate) fn bindings(&self) -> Vec<(u16, HostPortSpec)> {
        match self {
            Self::None => Vec::new(),
            Self::Published(mapping) => mapping.clone(),
            Self::Exposed(ports) => ports
                .iter()
                .map(|&p| (p, HostPortSpec::default()))
                .collect(),
        }
    }
}

impl From<Vec<u16>> for Ports {
    fn from(ports: Vec<u16>) -> Self {
        Self::Exposed(ports)
    }
}

/// A file or directory injected into the container's filesystem.
///
/// The source is packed into a single-entry tar stream keyed by the target's
/// base name and uploaded into the container at the target's parent
/// directory. This is an upload, not a bind mount, so the caller needs no
/// write access to the engine host's filesystem.
#[derive(Debug, Clone)]
pub struct Mount {
    /// Path on the test host.
    pub source: PathBuf,
    /// Path inside the container.
    pub target: PathBuf,
}

impl Mount {
    /// Creates a mount from a host source to a container target.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Packs the source into an in-memory tar archive named after the
    /// target's base name. Returns the archive bytes and the container
    /// directory to upload into.
    pub(crate) fn pack(&self) -> Result<(Vec<u8>, PathBuf)> {
        let entry_name = self.target.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("mount target '{}' has no base name", self.target.display()),
            )
        })?;

        let mut builder = tar::Builder::new(Vec::new());
        if self.source.is_dir() {
            builder.append_dir_all(entry_name, &self.source)?;
        } else {
            builder.append_path_with_name(&self.source, entry_name)?;
        }
        let data = builder.into_inner()?;

        let parent = match self.target.parent() {
            Some(parent) if parent != Path::new("") => parent.to_path_buf(),
            _ => PathBuf::from("/"),
        };

        Ok((data, parent))
    }
}

/// Everything needed to launch one container.
///
/// # Examples
///
/// ```
/// use dockrig::{LaunchSpec, Ports};
///
/// let spec = LaunchSpec::new("postgres", "postgres:16")
///     .alias("db")
///     .ports(Ports::Exposed(vec![5432]))
///     .env("POSTGRES_PASSWORD", "secret");
/// ```
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Logical service name; also the container hostname and first alias.
    pub service_name: String,
    /// The image to run.
    pub image: ImageSource,
    /// Logical registry name used to qualify the image, if any.
    pub registry: Option<String>,
    /// Extra DNS aliases on the isolated network.
    pub aliases: Vec<String>,
    /// Published ports.
    pub ports: Ports,
    /// Environment variables.
    pub environment: HashMap<String, String>,
    /// Files injected into the container filesystem.
    pub mounts: Vec<Mount>,
    /// Command override.
    pub command: Option<Vec<String>>,
    /// Pulls the image before launch even when image updating is off.
    pub force_pull: bool,
}

impl LaunchSpec {
    /// Creates a launch spec for a service and image.
    pub fn new(service_name: impl Into<String>, image: impl Into<ImageSource>) -> Self {
        Self {
            service_name: service_name.into(),
            image: image.into(),
            registry: None,
            aliases: Vec::new(),
            ports: Ports::None,
            environment: HashMap::new(),
            mounts: Vec::new(),
            command: None,
            force_pull: false,
        }
    }

    /// Qualifies the image through the named registry entry.
    pub fn registry(mut self, logical_name: impl Into<String>) -> Self {
        self.registry = Some(logical_name.into());
        self
    }

    /// Adds a DNS alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Sets the published ports.
    pub fn ports(mut self, ports: impl Into<Ports>) -> Self {
        self.ports = ports.into();
        self
    }

    /// Publishes a container port on an engine-assigned host port.
    pub fn expose(mut self, container_port: u16) -> Self {
        match &mut self.ports {
            Ports::Published(mapping) => mapping.push((container_port, HostPortSpec::default())),
            Ports::Exposed(ports) => ports.push(container_port),
            Ports::None => self.ports = Ports::Exposed(vec![container_port]),
        }
        self
    }

    /// Publishes a container port on a fixed host port.
    pub fn publish(self, container_port: u16, host_port: u16) -> Self {
        self.publish_to(container_port, HostPortSpec::port(host_port))
    }

    /// Publishes a container port on a fixed host port bound to one host
    /// interface, e.g. `127.0.0.1`.
    pub fn publish_on(self, container_port: u16, host_ip: impl Into<String>, host_port: u16) -> Self {
        self.publish_to(container_port, HostPortSpec::on_ip(host_ip, host_port))
    }

    fn publish_to(mut self, container_port: u16, host: HostPortSpec) -> Self {
        let binding = (container_port, host);
        match &mut self.ports {
            Ports::Published(mapping) => mapping.push(binding),
            Ports::Exposed(ports) => {
                let mut mapping: Vec<_> = ports
                    .iter()
                    .map(|&p| (p, HostPortSpec::default()))
                    .collect();
                mapping.push(binding);
                self.ports = Ports::Published(mapping);
            }
            Ports::None => self.ports = Ports::Published(vec![binding]),
        }
        self
    }

    /// Sets an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Injects a host file or directory at a container path.
    pub fn mount(mut self, source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        self.mounts.push(Mount::new(source, target));
        self
    }

    /// Overrides the container command.
    pub fn command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    /// Pulls the image before launch even when image updating is off.
    pub fn force_pull(mut self, force: bool) -> Self {
        self.force_pull = force;
        self
    }

    pub(crate) fn resolve_image(&self) -> Result<DockerImage> {
        match &self.image {
            ImageSource::Name(name) => DockerImage::parse(name),
            ImageSource::Reference(image) => Ok(image.clone()),
        }
    }
}
