//! S3 protocol layer
//!
//! This module provides:
//! - [`connection::ConnectionDescriptor`] - Endpoint, credentials and bucket of one connection
//! - [`store::ObjectStore`] - The storage operations the engine drives
//! - [`client::S3Store`] - aws-sdk-s3 implementation, built by [`client::S3StoreFactory`]
//! - [`memory::MemoryStore`] - In-memory implementation for offline use
//! - [`types`] - Listing entries and operation results

mod body;
pub mod client;
pub mod connection;
pub mod memory;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use client::{S3Store, S3StoreFactory};
pub use connection::{ConnectionDescriptor, ConnectionResolver, StaticResolver};
pub use memory::{FailPoint, MemoryStore, StoreCall};
pub use store::{ObjectStore, StoreFactory};
pub use types::{FileEntry, ListingResult, TransferResult};
