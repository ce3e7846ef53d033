use std::future::Future;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Result;
use directories::UserDirs;
use futures::{StreamExt, stream};
use regex::Regex;

use crate::models::{self, format_size};
use crate::storage::{BATCH_DELETE_MAX, BatchDeleteOutcome, StorageService};

/// How many folder prefixes drain concurrently during a delete.
const CONCURRENT_DRAINS: usize = 4;

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Delete {
        bucket: String,
        keys: Vec<String>,
    },
    Upload {
        bucket: String,
        prefix: String,
        source: PathBuf,
    },
    Download {
        bucket: String,
        key: String,
        dest: String,
    },
    CreateFolder {
        bucket: String,
        prefix: String,
        name: String,
    },
    CreateBucket {
        name: String,
    },
    ShowDetails {
        scheme: String,
        bucket: String,
        key: String,
    },
}

impl Operation {
    /// Status text (and its display time in seconds) shown while the task
    /// runs.
    pub fn progress(&self) -> (String, u64) {
        match self {
            Operation::Delete { keys, .. } => (format!("Deleting {} item(s)...", keys.len()), 3),
            Operation::Upload { source, .. } => {
                let name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (format!("Uploading {name}..."), 3)
            }
            Operation::Download { key, .. } => {
                (format!("Downloading {}...", models::file_name(key)), 3)
            }
            Operation::CreateFolder { name, .. } => (format!("Creating folder {name}..."), 3),
            Operation::CreateBucket { name } => (format!("Creating bucket {name}..."), 3),
            Operation::ShowDetails {
                scheme,
                bucket,
                key,
            } => (format!("{scheme}://{bucket}/{key}"), 5),
        }
    }
}

/// What a finished operation hands back to the event loop.
#[derive(Debug)]
pub struct OpOutcome {
    pub message: String,
    pub error: bool,
    pub refresh: Refresh,
    /// Keys to drop from the loaded list when only part of a delete went
    /// through; no full refresh happens in that case.
    pub remove_keys: Vec<String>,
    pub status_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refresh {
    None,
    Objects,
    Buckets,
}

impl OpOutcome {
    fn success(message: String, refresh: Refresh) -> Self {
        Self {
            message,
            error: false,
            refresh,
            remove_keys: Vec::new(),
            status_secs: 3,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            message,
            error: true,
            refresh: Refresh::None,
            remove_keys: Vec::new(),
            status_secs: 3,
        }
    }
}

pub async fn run(gateway: StorageService, op: Operation) -> OpOutcome {
    match op {
        Operation::Delete { bucket, keys } => delete(gateway, &bucket, keys).await,
        Operation::Upload {
            bucket,
            prefix,
            source,
        } => upload(gateway, &bucket, &prefix, source).await,
        Operation::Download { bucket, key, dest } => download(gateway, &bucket, &key, &dest).await,
        Operation::CreateFolder {
            bucket,
            prefix,
            name,
        } => create_folder(gateway, &bucket, &prefix, &name).await,
        Operation::CreateBucket { name } => create_bucket(gateway, &name).await,
        Operation::ShowDetails {
            scheme,
            bucket,
            key,
        } => show_details(gateway, &scheme, &bucket, &key).await,
    }
}

/// Folder keys (trailing `/`) are drained recursively page by page; plain
/// keys go straight to batch deletes. A failed key or page never aborts the
/// rest.
async fn delete(gateway: StorageService, bucket: &str, keys: Vec<String>) -> OpOutcome {
    let (folders, plain): (Vec<String>, Vec<String>) =
        keys.into_iter().partition(|key| key.ends_with('/'));

    let mut deleted = 0usize;
    let mut removed: Vec<String> = Vec::new();
    let mut failures: Vec<String> = Vec::new();

    let drains = folders.into_iter().map(|prefix| {
        let gateway = gateway.clone();
        let bucket = bucket.to_string();
        async move {
            let (count, errors) = purge_prefix(
                |token| {
                    let gateway = gateway.clone();
                    let bucket = bucket.clone();
                    let prefix = prefix.clone();
                    async move { gateway.list_keys_page(&bucket, &prefix, token).await }
                },
                |keys| {
                    let gateway = gateway.clone();
                    let bucket = bucket.clone();
                    async move { gateway.delete_objects(&bucket, &keys).await }
                },
            )
            .await;
            (prefix, count, errors)
        }
    });
    let drained: Vec<(String, usize, Vec<String>)> = stream::iter(drains)
        .buffer_unordered(CONCURRENT_DRAINS)
        .collect()
        .await;
    for (prefix, count, errors) in drained {
        deleted += count;
        if errors.is_empty() {
            removed.push(prefix);
        }
        failures.extend(errors);
    }

    for chunk in plain.chunks(BATCH_DELETE_MAX) {
        match gateway.delete_objects(bucket, chunk).await {
            Ok(outcome) => {
                deleted += outcome.deleted.len();
                removed.extend(outcome.deleted);
                failures.extend(outcome.errors);
            }
            Err(err) => failures.push(format!("{err:#}")),
        }
    }

    if failures.is_empty() {
        OpOutcome::success(format!("Deleted {deleted} item(s)"), Refresh::Objects)
    } else {
        OpOutcome {
            message: format!(
                "Deleted {deleted} item(s), {} failed: {}",
                failures.len(),
                failures[0]
            ),
            error: true,
            refresh: Refresh::None,
            remove_keys: removed,
            status_secs: 3,
        }
    }
}

/// Lists every key under a prefix across all continuation pages and deletes
/// them in bounded batches. Returns the deleted count and the collected
/// failure messages.
async fn purge_prefix<L, LF, D, DF>(mut list_page: L, mut delete_batch: D) -> (usize, Vec<String>)
where
    L: FnMut(Option<String>) -> LF,
    LF: Future<Output = Result<(Vec<String>, Option<String>)>>,
    D: FnMut(Vec<String>) -> DF,
    DF: Future<Output = Result<BatchDeleteOutcome>>,
{
    let mut deleted = 0usize;
    let mut failures: Vec<String> = Vec::new();
    let mut token: Option<String> = None;
    loop {
        match list_page(token.take()).await {
            Ok((keys, next)) => {
                for chunk in keys.chunks(BATCH_DELETE_MAX) {
                    match delete_batch(chunk.to_vec()).await {
                        Ok(outcome) => {
                            deleted += outcome.deleted.len();
                            failures.extend(outcome.errors);
                        }
                        Err(err) => failures.push(format!("{err:#}")),
                    }
                }
                token = next;
                if token.is_none() {
                    break;
                }
            }
            Err(err) => {
                failures.push(format!("{err:#}"));
                break;
            }
        }
    }
    (deleted, failures)
}

async fn upload(gateway: StorageService, bucket: &str, prefix: &str, source: PathBuf) -> OpOutcome {
    let Some(name) = source
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
    else {
        return OpOutcome::failure("Upload failed: source has no file name".to_string());
    };
    let bytes = match std::fs::read(&source) {
        Ok(bytes) => bytes,
        Err(err) => {
            return OpOutcome::failure(format!("Upload failed: {}: {err}", source.display()));
        }
    };
    let size = bytes.len() as u64;
    let key = format!("{prefix}{name}");
    match gateway.upload_object(bucket, &key, bytes).await {
        Ok(()) => OpOutcome::success(
            format!("Uploaded {name} ({})", format_size(size)),
            Refresh::Objects,
        ),
        Err(err) => OpOutcome::failure(format!("Upload failed: {err:#}")),
    }
}

async fn download(gateway: StorageService, bucket: &str, key: &str, dest: &str) -> OpOutcome {
    let path = resolve_download_dest(dest, key);
    match gateway.download_object(bucket, key, &path).await {
        Ok(written) => OpOutcome::success(
            format!(
                "Downloaded {} ({}) to {}",
                models::file_name(key),
                format_size(written),
                path.display()
            ),
            Refresh::None,
        ),
        Err(err) => OpOutcome::failure(format!("Download failed: {err:#}")),
    }
}

async fn create_folder(
    gateway: StorageService,
    bucket: &str,
    prefix: &str,
    name: &str,
) -> OpOutcome {
    let key = models::folder_key(prefix, name);
    match gateway.upload_object(bucket, &key, Vec::new()).await {
        Ok(()) => OpOutcome::success(
            format!("Created folder {}", models::file_name(&key)),
            Refresh::Objects,
        ),
        Err(err) => OpOutcome::failure(format!("Create folder failed: {err:#}")),
    }
}

async fn create_bucket(gateway: StorageService, name: &str) -> OpOutcome {
    match gateway.create_bucket(name).await {
        Ok(()) => OpOutcome::success(format!("Created bucket {name}"), Refresh::Buckets),
        Err(err) => OpOutcome::failure(format!("Create bucket failed: {err:#}")),
    }
}

async fn show_details(gateway: StorageService, scheme: &str, bucket: &str, key: &str) -> OpOutcome {
    let path = format!("{scheme}://{bucket}/{key}");
    let message = match gateway.head_object(bucket, key).await {
        Ok(details) => {
            let content_type = details
                .content_type
                .unwrap_or_else(|| "unknown type".to_string());
            format!("{path} ({}, {content_type})", format_size(details.size))
        }
        // the path is still worth showing when the head call fails
        Err(_) => path,
    };
    OpOutcome {
        message,
        error: false,
        refresh: Refresh::None,
        remove_keys: Vec::new(),
        status_secs: 5,
    }
}

/// Client-side check against the S3 naming rules before the call goes out.
pub fn valid_bucket_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// A destination ending in `/` gets the object's file name appended; a
/// leading `~/` expands to the home directory.
pub fn resolve_download_dest(dest: &str, key: &str) -> PathBuf {
    let trimmed = dest.trim();
    let expanded = expand_home(trimmed);
    if trimmed.ends_with('/') {
        expanded.join(models::file_name(key))
    } else {
        expanded
    }
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = UserDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn page(keys: &[&str], token: Option<&str>) -> Result<(Vec<String>, Option<String>)> {
        Ok((
            keys.iter().map(|k| k.to_string()).collect(),
            token.map(str::to_string),
        ))
    }

    #[tokio::test]
    async fn test_purge_prefix_drains_every_page() {
        let pages = Mutex::new(vec![
            page(&["logs/a", "logs/b"], Some("t1")),
            page(&["logs/c"], None),
        ]);
        let tokens: Mutex<Vec<Option<String>>> = Mutex::new(Vec::new());
        let batches: Mutex<Vec<Vec<String>>> = Mutex::new(Vec::new());

        let (deleted, failures) = purge_prefix(
            |token| {
                tokens.lock().unwrap().push(token.clone());
                let next = pages.lock().unwrap().remove(0);
                async move { next }
            },
            |keys| {
                batches.lock().unwrap().push(keys.clone());
                async move {
                    Ok(BatchDeleteOutcome {
                        deleted: keys,
                        errors: Vec::new(),
                    })
                }
            },
        )
        .await;

        assert_eq!(deleted, 3);
        assert!(failures.is_empty());
        assert_eq!(
            *tokens.lock().unwrap(),
            vec![None, Some("t1".to_string())]
        );
        assert_eq!(
            *batches.lock().unwrap(),
            vec![vec!["logs/a", "logs/b"], vec!["logs/c"]]
        );
    }

    #[tokio::test]
    async fn test_purge_prefix_chunks_oversized_pages() {
        let keys: Vec<String> = (0..2050).map(|i| format!("big/{i:04}")).collect();
        let pages = Mutex::new(vec![Ok((keys, None))]);
        let sizes: Mutex<Vec<usize>> = Mutex::new(Vec::new());

        let (deleted, failures) = purge_prefix(
            |_token| {
                let next = pages.lock().unwrap().remove(0);
                async move { next }
            },
            |chunk| {
                sizes.lock().unwrap().push(chunk.len());
                async move {
                    Ok(BatchDeleteOutcome {
                        deleted: chunk,
                        errors: Vec::new(),
                    })
                }
            },
        )
        .await;

        assert_eq!(deleted, 2050);
        assert!(failures.is_empty());
        assert_eq!(*sizes.lock().unwrap(), vec![1000, 1000, 50]);
    }

    #[tokio::test]
    async fn test_purge_prefix_keeps_going_after_a_failed_batch() {
        let pages = Mutex::new(vec![page(&["a"], Some("t1")), page(&["b"], None)]);

        let (deleted, failures) = purge_prefix(
            |_token| {
                let next = pages.lock().unwrap().remove(0);
                async move { next }
            },
            |chunk| async move {
                if chunk == ["a"] {
                    anyhow::bail!("simulated outage")
                }
                Ok(BatchDeleteOutcome {
                    deleted: chunk,
                    errors: Vec::new(),
                })
            },
        )
        .await;

        assert_eq!(deleted, 1);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("simulated outage"));
    }

    #[tokio::test]
    async fn test_purge_prefix_stops_on_list_failure() {
        let pages = Mutex::new(vec![
            page(&["x/1"], Some("t1")),
            Err(anyhow::anyhow!("list exploded")),
        ]);

        let (deleted, failures) = purge_prefix(
            |_token| {
                let next = pages.lock().unwrap().remove(0);
                async move { next }
            },
            |chunk| async move {
                Ok(BatchDeleteOutcome {
                    deleted: chunk,
                    errors: Vec::new(),
                })
            },
        )
        .await;

        assert_eq!(deleted, 1);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("list exploded"));
    }

    #[test]
    fn test_bucket_name_validation() {
        assert!(valid_bucket_name("my-bucket"));
        assert!(valid_bucket_name("logs.2024"));
        assert!(valid_bucket_name(&"a".repeat(63)));
        assert!(!valid_bucket_name("ab"));
        assert!(!valid_bucket_name(&"a".repeat(64)));
        assert!(!valid_bucket_name("My-Bucket"));
        assert!(!valid_bucket_name("-starts-wrong"));
        assert!(!valid_bucket_name("ends-wrong-"));
    }

    #[test]
    fn test_download_dest_resolution() {
        assert_eq!(
            resolve_download_dest("/tmp/out/", "a/b/report.pdf"),
            PathBuf::from("/tmp/out/report.pdf")
        );
        assert_eq!(
            resolve_download_dest("/tmp/renamed.pdf", "a/b/report.pdf"),
            PathBuf::from("/tmp/renamed.pdf")
        );
    }

    #[test]
    fn test_home_expansion() {
        let home = UserDirs::new().unwrap().home_dir().to_path_buf();
        assert_eq!(expand_home("~/x.bin"), home.join("x.bin"));
        assert_eq!(expand_home("/abs/x.bin"), PathBuf::from("/abs/x.bin"));
    }
}
