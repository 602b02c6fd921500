//! Session-scoped Docker containers for integration tests.
//!
//! This crate launches ephemeral containers on a per-run isolated bridge
//! network, resolves a host/port a test process can actually connect to
//! regardless of where the Docker daemon runs, and guarantees teardown of
//! everything it created.
//!
//! # Overview
//!
//! A [`DockerRig`] owns one test run:
//! - **Isolation**: every run gets its own bridge network and
//!   collision-free container names, so concurrent runs on a shared daemon
//!   never interfere
//! - **Launch**: images are qualified against configured registries, pulled
//!   at most once per run, and containers come up attached to the run's
//!   network under DNS aliases
//! - **Reachability**: [`ContainerHandle::connectable_host_and_port`] walks
//!   the host's routing table to prefer a direct container route and falls
//!   back to the published host-side binding
//! - **Teardown**: [`DockerRig::remove_all`] removes every owned container
//!   and the network, tolerating individual removal failures
//!
//! # Architecture
//!
//! - [`rig`](DockerRig): the orchestration core and launch specifications
//! - [`engine`]: the [`ContainerEngine`](engine::ContainerEngine) trait and
//!   its Docker implementation
//! - [`image`]: image references and registry configuration
//! - [`routing`]: host routing-table capture for reachability decisions
//! - [`error`]: the crate-wide error type
//!
//! # Example
//!
//! ```ignore
//! use dockrig::{DockerRig, LaunchSpec, Ports, RegistryDirectory, RigConfig};
//!
//! #[tokio::main]
//! async fn main() -> dockrig::Result<()> {
//!     let rig = DockerRig::connect(RigConfig::from_env(), RegistryDirectory::from_env()?).await?;
//!
//!     let postgres = rig
//!         .launch(
//!             LaunchSpec::new("postgres", "postgres:16")
//!                 .ports(Ports::Exposed(vec![5432]))
//!                 .env("POSTGRES_PASSWORD", "secret"),
//!         )
//!         .await?;
//!
//!     let (host, port) = postgres.connectable_host_and_port(5432).await?;
//!     println!("postgres reachable at {host}:{port}");
//!
//!     rig.remove_all().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod image;
pub mod routing;

mod rig;

pub use engine::HostPortSpec;
pub use error::{Result, RigError};
pub use image::{DockerImage, RegistryCredentials, RegistryDirectory, RegistryEntry};
pub use rig::{
    ContainerHandle, DockerRig, DumpOptions, ImageSource, LaunchSpec, Mount, Ports, RigConfig,
    RigConfigBuilder,
};
pub use routing::{Ipv4Network, RouteEntry, RoutingTable};
