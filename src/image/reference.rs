//! The docker image reference value type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RigError};
use crate::image::registry::RegistryEntry;

/// A parsed docker image reference.
///
/// Splits a `[registry/]name[:tag]` string into its parts, where `name` and
/// `tag` are restricted to lowercase letters, digits, `-`, `_` and `.`, and
/// the registry is everything before the last `/`. The value is immutable;
/// the `with_*` methods return modified copies.
///
/// An image marked `use_local` must be satisfied from the engine's local
/// image cache and is never pulled, even when untagged.
///
/// # Examples
///
/// ```
/// use dockrig::DockerImage;
///
/// let image = DockerImage::parse("superreg:9000/mongo:latest").unwrap();
/// assert_eq!(image.registry(), Some("superreg:9000"));
/// assert_eq!(image.name(), "mongo");
/// assert_eq!(image.tag(), Some("latest"));
/// assert_eq!(image.full_name(), "superreg:9000/mongo:latest");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DockerImage {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    use_local: bool,
}

fn is_name_part(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

impl DockerImage {
    /// Parses a full image name into a reference.
    ///
    /// # Errors
    ///
    /// Returns [`RigError::MalformedImageName`] if the string does not match
    /// the `[registry/]name[:tag]` grammar.
    pub fn parse(full_name: &str) -> Result<Self> {
        let (registry, rest) = match full_name.rsplit_once('/') {
            Some((registry, rest)) if !registry.is_empty() => (Some(registry), rest),
            Some(_) => return Err(RigError::malformed_image_name(full_name)),
            None => (None, full_name),
        };

        let (name, tag) = match rest.split_once(':') {
            Some((name, tag)) => (name, Some(tag)),
            None => (rest, None),
        };

        if !is_name_part(name) || !tag.map_or(true, is_name_part) {
            return Err(RigError::malformed_image_name(full_name));
        }

        Ok(Self {
            registry: registry.map(str::to_string),
            name: name.to_string(),
            tag: tag.map(str::to_string),
            use_local: false,
        })
    }

    /// Parses a full image name into a local-only reference.
    pub fn parse_local(full_name: &str) -> Result<Self> {
        Ok(Self::parse(full_name)?.with_use_local(true))
    }

    /// The registry prefix, if present.
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// The bare image name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tag, if present.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Whether this reference must be satisfied from the local image cache.
    pub fn use_local(&self) -> bool {
        self.use_local
    }

    /// The full canonical name of this image without the tag.
    pub fn tagless_name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.name),
            None => self.name.clone(),
        }
    }

    /// The full canonical name of this image, used verbatim as the
    /// engine-facing identifier.
    pub fn full_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}:{}", self.tagless_name(), tag),
            None => self.tagless_name(),
        }
    }

    /// Returns a copy with the tag replaced.
    pub fn with_tag(&self, tag: Option<impl Into<String>>) -> Self {
        Self {
            tag: tag.map(Into::into),
            ..self.clone()
        }
    }

    /// Returns a copy with the registry replaced.
    pub fn with_registry(&self, registry: Option<impl Into<String>>) -> Self {
        Self {
            registry: registry.map(Into::into),
            ..self.clone()
        }
    }

    /// Returns a copy with the `use_local` flag replaced.
    pub fn with_use_local(&self, use_local: bool) -> Self {
        Self {
            use_local,
            ..self.clone()
        }
    }

    /// Qualifies this reference with a registry entry.
    ///
    /// Attaches the entry's registry host when the reference has none, and
    /// applies the entry's default tag when the reference is untagged.
    ///
    /// # Errors
    ///
    /// Returns [`RigError::RegistryMismatch`] if the reference already names
    /// a different registry than the entry.
    pub fn qualify(&self, entry: &RegistryEntry) -> Result<Self> {
        let registry = match (&self.registry, entry.registry_host()) {
            (Some(existing), Some(host)) if existing != host => {
                return Err(RigError::RegistryMismatch {
                    image: self.full_name(),
                    existing: existing.clone(),
                    requested: host.to_string(),
                });
            }
            (Some(existing), _) => Some(existing.clone()),
            (None, host) => host.map(str::to_string),
        };

        let tag = match (&self.tag, entry.default_tag()) {
            (Some(tag), _) => Some(tag.clone()),
            (None, default) => default.map(str::to_string),
        };

        Ok(Self {
            registry,
            tag,
            ..self.clone()
        })
    }

    /// Applies the fallback tag when the reference is untagged and not
    /// local-only. A local-only untagged reference stays untagged so the
    /// cached image is used as-is.
    pub fn or_default_tag(&self, default_tag: &str) -> Self {
        if self.tag.is_none() && !self.use_local {
            self.with_tag(Some(default_tag))
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for DockerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}
