//! Registry directory: logical registry names mapped to hosts and credentials.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RigError};

/// Login credentials for a private registry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentials {
    /// Login user name.
    pub username: String,
    /// Login password.
    pub password: String,
}

impl RegistryCredentials {
    /// Creates a new credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Metadata for one registry, keyed by a logical name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    logical_name: String,
    registry_host: Option<String>,
    default_tag: Option<String>,
    credentials: Option<RegistryCredentials>,
}

impl RegistryEntry {
    /// Creates an entry under the given logical name.
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            registry_host: None,
            default_tag: None,
            credentials: None,
        }
    }

    /// Sets the registry host used to qualify bare image references.
    pub fn with_registry_host(mut self, host: impl Into<String>) -> Self {
        self.registry_host = Some(host.into());
        self
    }

    /// Sets the tag applied to untagged references qualified with this entry.
    pub fn with_default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tag = Some(tag.into());
        self
    }

    /// Attaches login credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(RegistryCredentials::new(username, password));
        self
    }

    /// The logical name of this entry.
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// The registry host, if configured.
    pub fn registry_host(&self) -> Option<&str> {
        self.registry_host.as_deref()
    }

    /// The default tag, if configured.
    pub fn default_tag(&self) -> Option<&str> {
        self.default_tag.as_deref()
    }

    /// The login credentials, if configured.
    pub fn credentials(&self) -> Option<&RegistryCredentials> {
        self.credentials.as_ref()
    }
}

/// An in-memory directory of registry entries, indexed both by logical name
/// and by registry host.
///
/// Both indexes enforce uniqueness at insertion time: registering a second
/// entry under an existing logical name, or an existing registry host, fails
/// instead of silently overwriting. The directory is built once at session
/// start and never performs I/O.
#[derive(Debug, Clone, Default)]
pub struct RegistryDirectory {
    entries: Vec<RegistryEntry>,
    by_name: HashMap<String, usize>,
    by_host: HashMap<String, usize>,
}

impl RegistryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from the process environment.
    ///
    /// When `DOCKER_REGISTRY` is set, a single entry with logical name
    /// `default` is created for it; `DOCKERLOGINUSER`/`DOCKERLOGINPASS`
    /// attach credentials to that entry.
    ///
    /// # Errors
    ///
    /// Fails when a login user is configured without a password.
    pub fn from_env() -> Result<Self> {
        let mut directory = Self::new();

        if let Ok(host) = std::env::var("DOCKER_REGISTRY") {
            let mut entry = RegistryEntry::new("default").with_registry_host(host);

            if let Ok(username) = std::env::var("DOCKERLOGINUSER") {
                let password = std::env::var("DOCKERLOGINPASS").map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "DOCKERLOGINUSER is set without DOCKERLOGINPASS",
                    )
                })?;
                entry = entry.with_credentials(username, password);
            }

            directory.register(entry)?;
        }

        Ok(directory)
    }

    /// Registers an entry.
    ///
    /// # Errors
    ///
    /// Returns [`RigError::DuplicateRegistryEntry`] if the logical name or
    /// the registry host is already present.
    pub fn register(&mut self, entry: RegistryEntry) -> Result<()> {
        if self.by_name.contains_key(entry.logical_name()) {
            return Err(RigError::duplicate_registry_entry(format!(
                "logical name '{}'",
                entry.logical_name()
            )));
        }

        if let Some(host) = entry.registry_host() {
            if self.by_host.contains_key(host) {
                return Err(RigError::duplicate_registry_entry(format!(
                    "registry host '{host}'"
                )));
            }
        }

        let index = self.entries.len();
        self.by_name.insert(entry.logical_name().to_string(), index);
        if let Some(host) = entry.registry_host() {
            self.by_host.insert(host.to_string(), index);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Looks up an entry by logical name.
    ///
    /// # Errors
    ///
    /// Returns [`RigError::RegistryEntryNotFound`] if absent.
    pub fn lookup_by_name(&self, name: &str) -> Result<&RegistryEntry> {
        self.by_name
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RigError::RegistryEntryNotFound(name.to_string()))
    }

    /// Looks up an entry by registry host, e.g. to find pull credentials for
    /// a qualified image reference.
    pub fn lookup_by_host(&self, host: &str) -> Option<&RegistryEntry> {
        self.by_host.get(host).map(|&i| &self.entries[i])
    }

    /// The number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
