//! Error types for the dockrig crate.

use std::time::Duration;

use thiserror::Error;

/// Result type for dockrig operations.
pub type Result<T> = std::result::Result<T, RigError>;

/// Errors that can occur while provisioning or addressing test containers.
#[derive(Debug, Error)]
pub enum RigError {
    /// The image string does not match `[registry/]name[:tag]`.
    #[error("malformed docker image name: '{0}'")]
    MalformedImageName(String),

    /// An image already carries a registry that differs from the one it is
    /// being qualified with.
    #[error("image '{image}' already names registry '{existing}', cannot qualify with '{requested}'")]
    RegistryMismatch {
        /// The full image reference.
        image: String,
        /// The registry already present on the image.
        existing: String,
        /// The registry host of the qualifying entry.
        requested: String,
    },

    /// A registry entry collides with an existing one on logical name or host.
    #[error("duplicate registry entry: {0}")]
    DuplicateRegistryEntry(String),

    /// No registry entry under the given logical name.
    #[error("no registry entry named '{0}'")]
    RegistryEntryNotFound(String),

    /// The container id is not owned by this rig.
    #[error("unknown container: {0}")]
    UnknownContainer(String),

    /// Neither a container id nor a service name matched.
    #[error("no container found for '{0}'")]
    UnknownService(String),

    /// A known container has no address on the queried network.
    #[error("container {container_id} has no address on network '{network}'")]
    NoNetworkAddress {
        /// The container ID.
        container_id: String,
        /// The network that was queried.
        network: String,
    },

    /// The container does not publish the requested port at all.
    #[error("port {port}/tcp of container {container_id} is not published")]
    PortNotPublished {
        /// The container ID.
        container_id: String,
        /// The internal container port.
        port: u16,
    },

    /// The engine kept reporting an empty binding list for a published port.
    #[error("timeout after {waited:?} obtaining bound ports for container {container_id}, port {port}/tcp")]
    PortBindingTimeout {
        /// The container ID.
        container_id: String,
        /// The internal container port.
        port: u16,
        /// How long the binding was polled for.
        waited: Duration,
    },

    /// A published port is bound to an address the test process cannot reach.
    #[error("port is bound to '{bound_host}', which is not reachable from '{docker_host}'")]
    UnreachableBinding {
        /// The host address the engine reports for the binding.
        bound_host: String,
        /// The configured daemon host label.
        docker_host: String,
    },

    /// The engine reported a binding that could not be interpreted.
    #[error("container {container_id} reports malformed port binding '{value}'")]
    MalformedBinding {
        /// The container ID.
        container_id: String,
        /// The offending binding value.
        value: String,
    },

    /// Failed to pull an image.
    #[error("failed to pull image {image}: {reason}")]
    ImagePullFailed {
        /// The image that failed to pull.
        image: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Failed to create the isolated network.
    #[error("failed to create network {name}: {reason}")]
    NetworkCreation {
        /// The network name.
        name: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A container handle outlived the rig it belongs to.
    #[error("container rig has been torn down")]
    RigGone,

    /// Docker API error.
    #[error("Docker API error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RigError {
    /// Creates a malformed image name error.
    pub fn malformed_image_name(name: impl Into<String>) -> Self {
        Self::MalformedImageName(name.into())
    }

    /// Creates an unknown container error.
    pub fn unknown_container(id: impl Into<String>) -> Self {
        Self::UnknownContainer(id.into())
    }

    /// Creates an unknown service error.
    pub fn unknown_service(designation: impl Into<String>) -> Self {
        Self::UnknownService(designation.into())
    }

    /// Creates a duplicate registry entry error.
    pub fn duplicate_registry_entry(what: impl Into<String>) -> Self {
        Self::DuplicateRegistryEntry(what.into())
    }

    /// Creates an image pull failed error.
    pub fn image_pull_failed(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImagePullFailed {
            image: image.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing-network-address error.
    pub fn no_network_address(container_id: impl Into<String>, network: impl Into<String>) -> Self {
        Self::NoNetworkAddress {
            container_id: container_id.into(),
            network: network.into(),
        }
    }

    /// Creates a network creation failed error.
    pub fn network_creation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkCreation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownContainer(_) | Self::UnknownService(_) | Self::RegistryEntryNotFound(_)
        )
    }

    /// Returns true if this is a configuration or validation error raised
    /// before any engine call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MalformedImageName(_)
                | Self::RegistryMismatch { .. }
                | Self::DuplicateRegistryEntry(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RigError::unknown_container("abc123");
        assert_eq!(err.to_string(), "unknown container: abc123");

        let err = RigError::PortNotPublished {
            container_id: "abc123".to_string(),
            port: 5432,
        };
        assert_eq!(
            err.to_string(),
            "port 5432/tcp of container abc123 is not published"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(RigError::unknown_container("x").is_not_found());
        assert!(RigError::RegistryEntryNotFound("x".to_string()).is_not_found());
        assert!(!RigError::RigGone.is_not_found());

        assert!(RigError::malformed_image_name("Bad Name!").is_validation());
        assert!(!RigError::RigGone.is_validation());
    }
}
