//! S3 Transfer Engine Library
//!
//! Lists, uploads, downloads and deletes objects in S3-compatible buckets,
//! switching between single-request and multipart uploads by payload size.
//! Callers supply connection parameters through a
//! [`s3::ConnectionResolver`] and receive results and progress events.

pub mod config;
pub mod error;
pub mod s3;
pub mod transfer;

pub use config::TransferConfig;
pub use error::{Result, StoreError, TransferError};
pub use transfer::{ProgressEvent, ProgressSink, TransferEngine};
