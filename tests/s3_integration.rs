//! Integration tests for the transfer engine using MinIO via testcontainers
//!
//! These tests require Docker to be running and use the testcontainers crate
//! to spin up a MinIO instance for realistic S3 testing.
//!
//! Run with: cargo test --test s3_integration
//!
//! Note: Tests are conditionally skipped if Docker is not available.

use bytes::Bytes;
use s3_transfer::s3::{ConnectionDescriptor, S3Store, StaticResolver};
use s3_transfer::transfer::{NoProgress, UploadBuffer, UploadFile};
use s3_transfer::{ProgressEvent, ProgressSink, TransferConfig, TransferEngine};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::minio::MinIO;
use tokio_util::sync::CancellationToken;

/// MinIO default credentials
const MINIO_ACCESS_KEY: &str = "minioadmin";
const MINIO_SECRET_KEY: &str = "minioadmin";

const CONN: &str = "minio";

/// Helper to get MinIO endpoint URL from container
async fn get_minio_endpoint(container: &ContainerAsync<MinIO>) -> String {
    let host = container.get_host().await.expect("Failed to get container host");
    let port = container.get_host_port_ipv4(9000).await.expect("Failed to get MinIO port");
    format!("http://{}:{}", host, port)
}

/// Test helper to check if Docker is available
fn docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn minio_connection(endpoint: &str, bucket: &str) -> ConnectionDescriptor {
    ConnectionDescriptor {
        id: CONN.to_string(),
        display_name: "MinIO".to_string(),
        endpoint_host: endpoint.to_string(),
        access_key_id: MINIO_ACCESS_KEY.to_string(),
        access_key_secret: MINIO_SECRET_KEY.to_string(),
        bucket: bucket.to_string(),
        region: "us-east-1".to_string(),
        use_ssl: false,
        force_path_style: true,
    }
}

/// Start MinIO, create `bucket` and return a resolver pointing at it
async fn start_minio(bucket: &str) -> (ContainerAsync<MinIO>, StaticResolver) {
    let container = MinIO::default()
        .with_env_var("MINIO_ROOT_USER", MINIO_ACCESS_KEY)
        .with_env_var("MINIO_ROOT_PASSWORD", MINIO_SECRET_KEY)
        .start()
        .await
        .expect("Failed to start MinIO container");

    let endpoint = get_minio_endpoint(&container).await;

    // Wait for MinIO to be ready
    tokio::time::sleep(Duration::from_secs(2)).await;

    let connection = minio_connection(&endpoint, bucket);
    S3Store::new(&connection)
        .expect("Failed to create MinIO client")
        .create_bucket(bucket)
        .await
        .expect("Failed to create bucket");

    (container, StaticResolver::new().with_connection(connection))
}

/// Test small uploads and listing with folder markers
#[tokio::test]
async fn test_upload_and_list_with_folders() {
    if !docker_available() {
        eprintln!("Skipping test: Docker not available");
        return;
    }

    let (_container, resolver) = start_minio("files-bucket").await;
    let engine = TransferEngine::default();
    let cancel = CancellationToken::new();

    for (name, body) in [("readme.md", "# Readme"), ("guide.md", "# Guide")] {
        engine
            .upload_buffer(
                &resolver,
                CONN,
                UploadBuffer {
                    prefix: "docs/".to_string(),
                    file_name: name.to_string(),
                    data: Bytes::from(body),
                },
                Arc::new(NoProgress),
                &cancel,
            )
            .await
            .expect("Failed to upload");
    }
    engine.create_folder(&resolver, CONN, "docs/", &cancel).await.unwrap();
    engine.create_folder(&resolver, CONN, "docs/sub/", &cancel).await.unwrap();

    let listing = engine
        .list(&resolver, CONN, "docs/", &cancel)
        .await
        .expect("Failed to list docs objects");

    let keys: Vec<&str> = listing.files.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, vec!["docs/guide.md", "docs/readme.md"]);
    assert_eq!(listing.folders, vec!["docs/sub/"]);

    let root = engine.list(&resolver, CONN, "", &cancel).await.unwrap();
    assert_eq!(root.folders, vec!["docs/"]);
    assert!(root.files.is_empty());
}

/// Test a multipart upload followed by a download of the same object
#[tokio::test]
async fn test_multipart_upload_and_download() {
    if !docker_available() {
        eprintln!("Skipping test: Docker not available");
        return;
    }

    let (_container, resolver) = start_minio("large-bucket").await;
    let engine = TransferEngine::new(TransferConfig::default()).unwrap();
    let cancel = CancellationToken::new();

    let dir = TempDir::new().unwrap();
    let source = dir.path().join("large.bin");
    let data: Vec<u8> = (0..(25 * 1024 * 1024)).map(|i| (i % 253) as u8).collect();
    std::fs::write(&source, &data).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let collected = events.clone();
    let sink: Arc<dyn ProgressSink> =
        Arc::new(move |e: ProgressEvent| collected.lock().unwrap().push(e.bytes_transferred));

    let result = engine
        .upload_file(
            &resolver,
            CONN,
            &UploadFile {
                prefix: "archives/".to_string(),
                path: source,
                file_name: None,
            },
            sink,
            &cancel,
        )
        .await
        .expect("Failed multipart upload");

    assert_eq!(result.key, "archives/large.bin");
    assert_eq!(result.size, 26_214_400);
    assert_eq!(*events.lock().unwrap(), vec![10_485_760, 20_971_520, 26_214_400]);

    let target = dir.path().join("downloaded.bin");
    let download = engine
        .download_file(
            &resolver,
            CONN,
            "archives/large.bin",
            &target,
            Arc::new(NoProgress),
            &cancel,
        )
        .await
        .expect("Failed to download");

    assert_eq!(download.size, data.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), data);
}

/// Test single object deletion
#[tokio::test]
async fn test_delete_object() {
    if !docker_available() {
        eprintln!("Skipping test: Docker not available");
        return;
    }

    let (_container, resolver) = start_minio("delete-test").await;
    let engine = TransferEngine::default();
    let cancel = CancellationToken::new();

    engine
        .upload_buffer(
            &resolver,
            CONN,
            UploadBuffer {
                prefix: String::new(),
                file_name: "to-delete.txt".to_string(),
                data: Bytes::from("Delete me"),
            },
            Arc::new(NoProgress),
            &cancel,
        )
        .await
        .unwrap();

    engine
        .delete_object(&resolver, CONN, "to-delete.txt", &cancel)
        .await
        .expect("Failed to delete");

    // Deleting again is not an error
    engine
        .delete_object(&resolver, CONN, "to-delete.txt", &cancel)
        .await
        .expect("Second delete should succeed");

    let listing = engine.list(&resolver, CONN, "", &cancel).await.unwrap();
    assert!(listing.files.is_empty());
}

/// Test folder deletion with pagination across many objects
#[tokio::test]
async fn test_delete_folder_with_pagination() {
    if !docker_available() {
        eprintln!("Skipping test: Docker not available");
        return;
    }

    let (_container, resolver) = start_minio("pagination-test").await;
    let config = TransferConfig {
        list_page_size: 10,
        ..Default::default()
    };
    let engine = TransferEngine::new(config).unwrap();
    let cancel = CancellationToken::new();

    // Upload 25 objects
    for i in 0..25 {
        engine
            .upload_buffer(
                &resolver,
                CONN,
                UploadBuffer {
                    prefix: "batch/".to_string(),
                    file_name: format!("file-{:04}.txt", i),
                    data: Bytes::from(format!("content {}", i)),
                },
                Arc::new(NoProgress),
                &cancel,
            )
            .await
            .unwrap();
    }

    let listing = engine.list(&resolver, CONN, "batch/", &cancel).await.unwrap();
    assert_eq!(listing.files.len(), 25);

    let result = engine
        .delete_folder(&resolver, CONN, "batch/", &cancel)
        .await
        .expect("Failed to delete folder");
    assert_eq!(result.deleted, 25);

    let empty = engine
        .delete_folder(&resolver, CONN, "batch/", &cancel)
        .await
        .unwrap();
    assert_eq!(empty.deleted, 0);
}
