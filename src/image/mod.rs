//! Image references and registry metadata.

mod reference;
mod registry;

pub use reference::DockerImage;
pub use registry::{RegistryCredentials, RegistryDirectory, RegistryEntry};
