//! Connection descriptors and their resolution
//!
//! The engine never owns a connection store. Callers hand it a
//! [`ConnectionResolver`] on every call, and the engine resolves the
//! connection id into a read-only [`ConnectionDescriptor`] before any
//! network traffic happens.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::TransferError;

/// Region used when a connection leaves it blank
pub const DEFAULT_REGION: &str = "us-east-1";

/// Everything needed to talk to one bucket on one endpoint
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionDescriptor {
    pub id: String,
    #[serde(alias = "name")]
    pub display_name: String,
    /// Endpoint URL or bare host; empty means the provider default
    #[serde(alias = "host")]
    pub endpoint_host: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub bucket: String,
    pub region: String,
    #[serde(alias = "ssl")]
    pub use_ssl: bool,
    pub force_path_style: bool,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("endpoint_host", &self.endpoint_host)
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("use_ssl", &self.use_ssl)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl ConnectionDescriptor {
    /// The bucket every storage operation targets
    pub fn bucket(&self) -> Result<&str, TransferError> {
        let bucket = self.bucket.trim();
        if bucket.is_empty() {
            return Err(TransferError::Configuration(format!(
                "connection '{}' has no bucket configured",
                self.id
            )));
        }
        Ok(bucket)
    }

    /// Region, falling back to [`DEFAULT_REGION`]
    pub fn region(&self) -> &str {
        let region = self.region.trim();
        if region.is_empty() {
            DEFAULT_REGION
        } else {
            region
        }
    }

    /// Normalized endpoint URL.
    ///
    /// A bare host gets `https://` when `use_ssl` is set and `http://`
    /// otherwise. Returns `None` when no endpoint is configured.
    pub fn endpoint_url(&self) -> Result<Option<String>, TransferError> {
        let host = self.endpoint_host.trim();
        if host.is_empty() {
            return Ok(None);
        }

        let candidate = if host.contains("://") {
            host.to_string()
        } else if self.use_ssl {
            format!("https://{}", host)
        } else {
            format!("http://{}", host)
        };

        let parsed = url::Url::parse(&candidate).map_err(|e| {
            TransferError::Configuration(format!("invalid endpoint '{}': {}", host, e))
        })?;

        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(TransferError::Configuration(format!(
                "invalid endpoint '{}': expected an http(s) URL",
                host
            )));
        }

        Ok(Some(candidate.trim_end_matches('/').to_string()))
    }
}

/// Maps a connection id to its descriptor
pub trait ConnectionResolver: Send + Sync {
    /// Look up a connection; `None` if the id is unknown
    fn resolve(&self, connection_id: &str) -> Option<ConnectionDescriptor>;
}

/// Resolve a connection id or fail with a configuration error
pub(crate) fn resolve_connection(
    resolver: &dyn ConnectionResolver,
    connection_id: &str,
) -> Result<ConnectionDescriptor, TransferError> {
    let descriptor = resolver.resolve(connection_id).ok_or_else(|| {
        TransferError::Configuration(format!("connection '{}' not found", connection_id))
    })?;
    descriptor.bucket()?;
    Ok(descriptor)
}

/// In-memory resolver over a fixed set of connections
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    connections: HashMap<String, ConnectionDescriptor>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a connection, keyed by its id
    pub fn with_connection(mut self, descriptor: ConnectionDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    pub fn insert(&mut self, descriptor: ConnectionDescriptor) {
        self.connections.insert(descriptor.id.clone(), descriptor);
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl FromIterator<ConnectionDescriptor> for StaticResolver {
    fn from_iter<T: IntoIterator<Item = ConnectionDescriptor>>(iter: T) -> Self {
        let mut resolver = Self::new();
        for descriptor in iter {
            resolver.insert(descriptor);
        }
        resolver
    }
}

impl ConnectionResolver for StaticResolver {
    fn resolve(&self, connection_id: &str) -> Option<ConnectionDescriptor> {
        self.connections.get(connection_id).cloned()
    }
}
