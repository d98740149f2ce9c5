//! Prefix listings

use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransferError};
use crate::s3::connection::ConnectionResolver;
use crate::s3::store::{ListPage, ListRequest, ListedObject};
use crate::s3::types::{is_folder_marker, FileEntry, ListingResult};
use crate::transfer::{cancellable, Connection, TransferEngine};

const DELIMITER: &str = "/";

impl From<ListedObject> for FileEntry {
    fn from(obj: ListedObject) -> Self {
        FileEntry {
            key: obj.key,
            size: obj.size,
            last_modified: obj.last_modified,
        }
    }
}

/// Files of a page, minus folder markers and the queried prefix itself
fn visible_files(prefix: &str, objects: Vec<ListedObject>) -> impl Iterator<Item = FileEntry> + '_ {
    objects
        .into_iter()
        .filter(move |o| !is_folder_marker(&o.key) && o.key != prefix)
        .map(FileEntry::from)
}

impl TransferEngine {
    /// List one level of the key hierarchy under `prefix`
    pub async fn list(
        &self,
        resolver: &dyn ConnectionResolver,
        connection_id: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<ListingResult> {
        let conn = self.connect(resolver, connection_id)?;

        let mut result = ListingResult {
            prefix: prefix.to_string(),
            ..Default::default()
        };

        self.for_each_page(&conn, prefix, Some(DELIMITER), cancel, |page| {
            result.folders.extend(page.common_prefixes);
            result.files.extend(visible_files(prefix, page.objects));
        })
        .await?;

        tracing::debug!(
            "Listed {}/{}: {} folders, {} files",
            conn.bucket,
            prefix,
            result.folders.len(),
            result.files.len()
        );

        Ok(result)
    }

    /// Every key under `prefix`, at any depth
    pub(crate) async fn collect_keys(
        &self,
        conn: &Connection,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.for_each_page(conn, prefix, None, cancel, |page| {
            keys.extend(page.objects.into_iter().map(|o| o.key));
        })
        .await?;
        Ok(keys)
    }

    /// Follow continuation tokens until the listing ends or the page cap is hit
    async fn for_each_page<F>(
        &self,
        conn: &Connection,
        prefix: &str,
        delimiter: Option<&str>,
        cancel: &CancellationToken,
        mut on_page: F,
    ) -> Result<()>
    where
        F: FnMut(ListPage) + Send,
    {
        let mut token: Option<String> = None;
        let mut pages: u32 = 0;

        loop {
            let request = ListRequest {
                bucket: &conn.bucket,
                prefix,
                delimiter,
                continuation_token: token.as_deref(),
                max_keys: self.config.list_page_size,
            };

            let mut page = cancellable(cancel, async {
                conn.store
                    .list_objects(request)
                    .await
                    .map_err(|e| TransferError::store("ListObjectsV2", e))
            })
            .await?;
            pages += 1;

            let next = page.next_continuation_token.take();
            on_page(page);

            match next {
                None => return Ok(()),
                Some(_) if self.config.max_list_pages.is_some_and(|max| pages >= max) => {
                    tracing::warn!(
                        "Listing of {}/{} truncated after {} page(s)",
                        conn.bucket,
                        prefix,
                        pages
                    );
                    return Ok(());
                }
                Some(next) => token = Some(next),
            }
        }
    }
}
