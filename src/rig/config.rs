//! Rig configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration for a [`DockerRig`](crate::DockerRig).
///
/// All environment-derived settings are threaded through here as plain
/// constructor data; the rig keeps no process-wide mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    /// Name prefix for the isolated network and all launched containers.
    pub basename: String,

    /// Externally-reachable daemon host label, substituted for wildcard
    /// (`0.0.0.0`/empty) host addresses in published port bindings.
    pub docker_host: String,

    /// DNS suffix for container aliases; each alias is also registered as
    /// `{alias}.{virtual_domain}` when set.
    pub virtual_domain: Option<String>,

    /// Fallback tag applied to untagged, non-local image references.
    pub default_tag: String,

    /// Engine API version pin as `(major, minor)`, if any.
    pub api_version: Option<(usize, usize)>,

    /// Whether to pull images before first use.
    pub update_images: bool,

    /// Forces the published-port-only routing path, bypassing internal
    /// container routing entirely.
    pub bypass_internal_routing: bool,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            basename: "dockrig-test".to_string(),
            docker_host: "localhost".to_string(),
            virtual_domain: Some("test.loc".to_string()),
            default_tag: "latest".to_string(),
            api_version: None,
            update_images: false,
            bypass_internal_routing: false,
        }
    }
}

impl RigConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RigConfigBuilder {
        RigConfigBuilder::default()
    }

    /// Builds a configuration from the process environment:
    /// `DOCKERTESTHOST` (daemon host label, default `localhost`),
    /// `DOCKERTESTVERSION` (API version pin, e.g. `1.43`) and
    /// `DOCKERLOGINUSER` (presence switches image updating on).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("DOCKERTESTHOST") {
            config.docker_host = host;
        }

        if let Ok(version) = std::env::var("DOCKERTESTVERSION") {
            config.api_version = parse_api_version(&version);
        }

        if std::env::var("DOCKERLOGINUSER").is_ok() {
            config.update_images = true;
        }

        config
    }

    /// Returns true when the external-routing escape hatch is active, either
    /// through configuration or through the presence of the
    /// `bypass_docker_internal_connection` marker file next to the crate.
    pub fn bypass_marker_present(&self) -> bool {
        self.bypass_internal_routing
            || Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("bypass_docker_internal_connection")
                .exists()
    }
}

fn parse_api_version(version: &str) -> Option<(usize, usize)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Builder for [`RigConfig`].
#[derive(Debug, Default)]
pub struct RigConfigBuilder {
    config: RigConfig,
}

impl RigConfigBuilder {
    /// Sets the basename.
    pub fn basename(mut self, basename: impl Into<String>) -> Self {
        self.config.basename = basename.into();
        self
    }

    /// Sets the daemon host label.
    pub fn docker_host(mut self, host: impl Into<String>) -> Self {
        self.config.docker_host = host.into();
        self
    }

    /// Sets the virtual DNS domain suffix.
    pub fn virtual_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.virtual_domain = Some(domain.into());
        self
    }

    /// Disables virtual-domain aliasing.
    pub fn no_virtual_domain(mut self) -> Self {
        self.config.virtual_domain = None;
        self
    }

    /// Sets the fallback tag for untagged, non-local images.
    pub fn default_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.default_tag = tag.into();
        self
    }

    /// Pins the engine API version.
    pub fn api_version(mut self, major: usize, minor: usize) -> Self {
        self.config.api_version = Some((major, minor));
        self
    }

    /// Sets whether images are pulled before first use.
    pub fn update_images(mut self, update: bool) -> Self {
        self.config.update_images = update;
        self
    }

    /// Forces the published-port-only routing path.
    pub fn bypass_internal_routing(mut self, bypass: bool) -> Self {
        self.config.bypass_internal_routing = bypass;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RigConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = RigConfig::builder()
            .basename("myproject")
            .docker_host("remote-ci")
            .virtual_domain("svc.loc")
            .default_tag("stable")
            .api_version(1, 43)
            .update_images(true)
            .build();

        assert_eq!(config.basename, "myproject");
        assert_eq!(config.docker_host, "remote-ci");
        assert_eq!(config.virtual_domain.as_deref(), Some("svc.loc"));
        assert_eq!(config.default_tag, "stable");
        assert_eq!(config.api_version, Some((1, 43)));
        assert!(config.update_images);
    }

    #[test]
    fn test_parse_api_version() {
        assert_eq!(parse_api_version("1.43"), Some((1, 43)));
        assert_eq!(parse_api_version("latest"), None);
        assert_eq!(parse_api_version("1.x"), None);
    }
}
