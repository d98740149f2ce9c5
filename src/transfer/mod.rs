//! Transfer engine
//!
//! [`TransferEngine`] is the entry point for every storage operation:
//! - listing ([`TransferEngine::list`])
//! - uploads from disk or memory, single-shot or multipart
//!   ([`TransferEngine::upload_file`], [`TransferEngine::upload_buffer`])
//! - downloads and object lifecycle operations
//!
//! Each call resolves its connection through the caller's
//! [`ConnectionResolver`], builds a store through the engine's
//! [`StoreFactory`] and shares no mutable state with other calls.

mod lifecycle;
mod listing;
pub mod multipart;
mod payload;
pub mod progress;
mod single;
pub mod strategy;
mod upload;

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::s3::client::S3StoreFactory;
use crate::s3::connection::{resolve_connection, ConnectionResolver};
use crate::s3::store::{ObjectStore, StoreFactory};

pub use multipart::SessionState;
pub use progress::{NoProgress, ProgressEvent, ProgressSink};
pub use strategy::{PartPlan, PartRange, TransferStrategy};
pub use upload::{UploadBuffer, UploadFile};

/// A resolved connection: its bucket and a store bound to it
pub(crate) struct Connection {
    pub(crate) bucket: String,
    pub(crate) store: Arc<dyn ObjectStore>,
}

/// Client-side transfer engine for S3-compatible buckets
#[derive(Clone)]
pub struct TransferEngine {
    factory: Arc<dyn StoreFactory>,
    config: TransferConfig,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self {
            factory: Arc::new(S3StoreFactory),
            config: TransferConfig::default(),
        }
    }
}

impl TransferEngine {
    /// Engine talking to S3-compatible endpoints through aws-sdk-s3
    pub fn new(config: TransferConfig) -> Result<Self> {
        Self::with_factory(Arc::new(S3StoreFactory), config)
    }

    /// Engine using a custom store factory
    pub fn with_factory(factory: Arc<dyn StoreFactory>, config: TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { factory, config })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Resolve a connection and build its store. No network traffic.
    pub(crate) fn connect(
        &self,
        resolver: &dyn ConnectionResolver,
        connection_id: &str,
    ) -> Result<Connection> {
        let descriptor = resolve_connection(resolver, connection_id)?;
        let bucket = descriptor.bucket()?.to_string();
        let store = self.factory.create(&descriptor)?;
        Ok(Connection { bucket, store })
    }
}

/// Run `future` unless `cancel` fires first
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::connection::{ConnectionDescriptor, StaticResolver};
    use crate::s3::memory::MemoryStore;

    #[test]
    fn test_engine_rejects_invalid_config() {
        let config = TransferConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            TransferEngine::new(config),
            Err(TransferError::Configuration(_))
        ));
    }

    #[test]
    fn test_connect_requires_bucket() {
        let engine =
            TransferEngine::with_factory(Arc::new(MemoryStore::new()), TransferConfig::default())
                .unwrap();
        let resolver = StaticResolver::new().with_connection(ConnectionDescriptor {
            id: "empty".to_string(),
            ..Default::default()
        });

        assert!(matches!(
            engine.connect(&resolver, "empty"),
            Err(TransferError::Configuration(_))
        ));
        assert!(matches!(
            engine.connect(&resolver, "unknown"),
            Err(TransferError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellable() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        cancel.cancel();
        let err = cancellable(&cancel, std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
