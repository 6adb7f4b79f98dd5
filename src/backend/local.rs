//! Local filesystem backend implementation
//!
//! Objects are regular files below a root directory. Writes land in a staging
//! area under `<root>/.storekit` and are published with a rename (replace) or
//! a hard link (create-if-absent), so readers never see a partial object.

use super::types::{AdapterCapabilities, ByteStream, FetchRequest, FetchResponse, ListRequest};
use super::BackendAdapter;
use crate::error::{StoreError, StoreResult};
use crate::path::ObjectPath;
use crate::types::{Attributes, Buffer, ListPage, ObjectMeta, PartToken, PutResult, TagSet};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use storekit_core_precondition::PutMode;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use walkdir::WalkDir;

const BACKEND: &str = "local";

/// Hidden directory holding staged writes and multipart sessions
const STAGING_DIR: &str = ".storekit";

/// Read granularity for streamed bodies
const CHUNK_SIZE: usize = 64 * 1024;

static NEXT_STAGING_ID: AtomicU64 = AtomicU64::new(0);

/// Local filesystem backend
///
/// # Example
///
/// ```no_run
/// use storekit::backend::{BackendAdapter, LocalAdapter};
/// use storekit::ObjectPath;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let adapter = LocalAdapter::new("/tmp/objects")?;
///     let meta = adapter.head(&ObjectPath::parse("data/file.txt")?).await?;
///     println!("Size: {} bytes", meta.size);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LocalAdapter {
    root: PathBuf,
}

impl LocalAdapter {
    /// Create a backend rooted at `root`, creating the directory if needed
    pub fn new<P: Into<PathBuf>>(root: P) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object path to its file, refusing the staging namespace
    fn resolve(&self, path: &ObjectPath) -> StoreResult<PathBuf> {
        if path.segments().next() == Some(STAGING_DIR) {
            return Err(StoreError::InvalidConfig(format!(
                "path {} is inside the reserved {} directory",
                path, STAGING_DIR
            )));
        }
        Ok(path
            .segments()
            .fold(self.root.clone(), |acc, segment| acc.join(segment)))
    }

    fn staging_file(&self) -> PathBuf {
        let id = NEXT_STAGING_ID.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(STAGING_DIR)
            .join(format!("stage-{}-{}", std::process::id(), id))
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join("uploads").join(upload_id)
    }

    /// Move a staged file to `dest`, replacing or refusing to replace
    ///
    /// The staged file is gone afterwards whether or not publication worked.
    async fn publish(&self, staged: &Path, dest: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        let published = self.place(staged, dest, overwrite, Placement::Link).await;
        let _ = fs::remove_file(staged).await;
        published
    }

    /// Put the file at `source` in place as `dest`
    ///
    /// Without `overwrite` the destination is claimed with a hard link, which
    /// fails atomically when it already exists.
    async fn place(
        &self,
        source: &Path,
        dest: &ObjectPath,
        overwrite: bool,
        placement: Placement,
    ) -> StoreResult<()> {
        let resolved = self.resolve(dest)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).await?;
        }
        clear_empty_dir(&resolved).await;

        if overwrite {
            fs::rename(source, &resolved).await?;
            return Ok(());
        }

        fs::hard_link(source, &resolved).await.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => StoreError::AlreadyExists {
                path: dest.to_string(),
            },
            _ => StoreError::Io(e),
        })?;
        if placement == Placement::Move {
            fs::remove_file(source).await?;
        }
        Ok(())
    }

    /// Remove directories left empty above `file`, stopping at the root
    async fn prune_empty_parents(&self, file: &Path) {
        let mut dir = file.parent();
        while let Some(current) = dir {
            if current == self.root || fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    async fn stat(&self, path: &ObjectPath) -> StoreResult<std::fs::Metadata> {
        let meta = fs::metadata(self.resolve(path)?)
            .await
            .map_err(|e| map_not_found(e, path))?;
        if !meta.is_file() {
            return Err(not_found(path));
        }
        Ok(meta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// The source is a staged file, removed by the caller
    Link,
    /// The source is an object and goes away once placed
    Move,
}

/// An empty directory at an object's location is a stale prefix, not an object
async fn clear_empty_dir(path: &Path) {
    if fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        let _ = fs::remove_dir(path).await;
    }
}

/// Write `bytes` to a new file at `staged`
async fn write_staged(staged: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut file = fs::File::create(staged).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

/// Concatenate part files, in the given order, into a new file at `staged`
async fn concat_parts(dir: &Path, parts: &[PartToken], staged: &Path) -> StoreResult<()> {
    let mut out = fs::File::create(staged).await?;
    for part in parts {
        let mut input = fs::File::open(dir.join(&part.content_id)).await.map_err(|e| {
            StoreError::backend(
                BACKEND,
                "InvalidPart",
                format!("part {} unreadable: {}", part.index, e),
            )
        })?;
        tokio::io::copy(&mut input, &mut out).await?;
    }
    out.flush().await?;
    Ok(())
}

fn not_found(path: &ObjectPath) -> StoreError {
    StoreError::NotFound {
        path: path.to_string(),
        backend: BACKEND.to_string(),
    }
}

fn map_not_found(e: std::io::Error, path: &ObjectPath) -> StoreError {
    if e.kind() == ErrorKind::NotFound {
        not_found(path)
    } else {
        StoreError::Io(e)
    }
}

fn no_such_upload(upload_id: &str) -> StoreError {
    StoreError::backend(
        BACKEND,
        "NoSuchUpload",
        format!("upload {} does not exist", upload_id),
    )
}

/// Convert std::fs::Metadata to object metadata
fn convert_metadata(path: ObjectPath, meta: &std::fs::Metadata) -> ObjectMeta {
    let last_modified = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    #[cfg(unix)]
    let inode = {
        use std::os::unix::fs::MetadataExt;
        meta.ino()
    };
    #[cfg(not(unix))]
    let inode = 0u64;

    let mtime = last_modified.timestamp_nanos_opt().unwrap_or_default();
    let e_tag = format!("\"{:x}-{:x}-{:x}\"", inode, mtime, meta.len());

    ObjectMeta {
        path,
        last_modified,
        size: meta.len(),
        e_tag: Some(e_tag),
        version: None,
    }
}

/// Stream `len` bytes of `file` from its current position
fn read_body(file: fs::File, len: u64) -> ByteStream {
    stream::unfold(
        (file, vec![0u8; CHUNK_SIZE], len),
        |(mut file, mut buffer, remaining)| async move {
            if remaining == 0 {
                return None;
            }
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            match file.read(&mut buffer[..want]).await {
                Ok(0) => None, // EOF
                Ok(n) => {
                    let data = Bytes::copy_from_slice(&buffer[..n]);
                    Some((Ok(data), (file, buffer, remaining - n as u64)))
                }
                Err(e) => Some((Err(StoreError::Io(e)), (file, buffer, 0))),
            }
        },
    )
    .boxed()
}

/// Walk the root and return sorted `(key, metadata)` pairs
fn scan(root: &Path, prefix: &str, after: Option<&str>) -> Vec<(String, std::fs::Metadata)> {
    let mut entries: Vec<(String, std::fs::Metadata)> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || e.file_name() != STAGING_DIR)
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e.path().strip_prefix(root).ok()?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect::<Option<Vec<_>>>()?
                .join("/");
            if !key.starts_with(prefix) || after.is_some_and(|a| key.as_str() <= a) {
                return None;
            }
            let meta = e.metadata().ok()?;
            Some((key, meta))
        })
        .collect();

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

#[async_trait]
impl BackendAdapter for LocalAdapter {
    fn name(&self) -> &str {
        BACKEND
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            atomic_copy_if_not_exists: true,
            native_rename: true,
            conditional_update: false,
        }
    }

    async fn fetch(&self, path: &ObjectPath, request: FetchRequest) -> StoreResult<FetchResponse> {
        if request.version.is_some() {
            return Err(StoreError::NotSupported {
                backend: BACKEND.to_string(),
                operation: "versioned read".to_string(),
            });
        }

        let mut file = fs::File::open(self.resolve(path)?)
            .await
            .map_err(|e| map_not_found(e, path))?;
        let fs_meta = file.metadata().await?;
        if !fs_meta.is_file() {
            return Err(not_found(path));
        }
        let meta = convert_metadata(path.clone(), &fs_meta);

        request
            .conditions
            .check(&meta.current_version())
            .map_err(|e| StoreError::from_precondition(e, path.as_str(), BACKEND))?;

        if request.head {
            return Ok(FetchResponse::head(meta, Attributes::new()));
        }

        let range = match &request.range {
            Some(range) => range
                .resolve(meta.size)
                .map_err(|reason| StoreError::InvalidRange {
                    path: path.to_string(),
                    reason,
                })?,
            None => 0..meta.size,
        };

        if range.start > 0 {
            file.seek(SeekFrom::Start(range.start)).await?;
        }

        Ok(FetchResponse {
            body: read_body(file, range.end - range.start),
            meta,
            range,
            attributes: Attributes::new(),
        })
    }

    async fn upload_full(
        &self,
        path: &ObjectPath,
        bytes: Buffer,
        mode: &PutMode,
        _attributes: &Attributes,
        _tags: &TagSet,
    ) -> StoreResult<PutResult> {
        let overwrite = match mode {
            PutMode::Overwrite => true,
            PutMode::Create => false,
            PutMode::Update(_) => {
                return Err(StoreError::NotSupported {
                    backend: BACKEND.to_string(),
                    operation: "conditional update".to_string(),
                })
            }
        };

        self.resolve(path)?;
        let staged = self.staging_file();
        if let Err(e) = write_staged(&staged, &bytes).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e);
        }
        self.publish(&staged, path, overwrite).await?;

        let meta = convert_metadata(path.clone(), &self.stat(path).await?);
        Ok(PutResult {
            e_tag: meta.e_tag,
            version: None,
        })
    }

    async fn create_multipart(
        &self,
        path: &ObjectPath,
        _attributes: &Attributes,
        _tags: &TagSet,
    ) -> StoreResult<String> {
        self.resolve(path)?;
        let upload_id = format!(
            "{}-{}",
            std::process::id(),
            NEXT_STAGING_ID.fetch_add(1, Ordering::Relaxed)
        );
        fs::create_dir_all(self.upload_dir(&upload_id)).await?;
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _path: &ObjectPath,
        upload_id: &str,
        index: u32,
        bytes: Buffer,
    ) -> StoreResult<PartToken> {
        let dir = self.upload_dir(upload_id);
        if !fs::try_exists(&dir).await? {
            return Err(no_such_upload(upload_id));
        }

        let content_id = format!("{:010}", index);
        let mut file = fs::File::create(dir.join(&content_id)).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(PartToken {
            index,
            content_id,
            size: bytes.len() as u64,
        })
    }

    async fn complete_multipart(
        &self,
        path: &ObjectPath,
        upload_id: &str,
        mut parts: Vec<PartToken>,
    ) -> StoreResult<PutResult> {
        let dir = self.upload_dir(upload_id);
        if !fs::try_exists(&dir).await? {
            return Err(no_such_upload(upload_id));
        }

        parts.sort_by_key(|p| p.index);
        let staged = self.staging_file();
        if let Err(e) = concat_parts(&dir, &parts, &staged).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e);
        }
        self.publish(&staged, path, true).await?;
        fs::remove_dir_all(&dir).await?;

        let meta = convert_metadata(path.clone(), &self.stat(path).await?);
        Ok(PutResult {
            e_tag: meta.e_tag,
            version: None,
        })
    }

    async fn abort_multipart(&self, _path: &ObjectPath, upload_id: &str) -> StoreResult<()> {
        fs::remove_dir_all(self.upload_dir(upload_id))
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => no_such_upload(upload_id),
                _ => StoreError::Io(e),
            })
    }

    async fn list_page(&self, request: ListRequest) -> StoreResult<ListPage> {
        let root = self.root.clone();
        let limit = request.max_results.max(1);
        let after = match (request.offset, request.token) {
            (Some(o), Some(t)) => Some(o.max(t)),
            (o, t) => o.or(t),
        };
        let prefix = request.prefix.unwrap_or_default();

        let entries = tokio::task::spawn_blocking(move || scan(&root, &prefix, after.as_deref()))
            .await
            .map_err(|e| StoreError::backend(BACKEND, "TaskFailed", e.to_string()))?;

        let has_more = entries.len() > limit;
        let mut objects = Vec::with_capacity(limit.min(entries.len()));
        for (key, meta) in entries.into_iter().take(limit) {
            objects.push(convert_metadata(ObjectPath::parse(&key)?, &meta));
        }

        let next_token = if has_more {
            objects.last().map(|m| m.path.to_string())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        self.stat(from).await?;

        let staged = self.staging_file();
        if let Err(e) = fs::copy(self.resolve(from)?, &staged).await {
            let _ = fs::remove_file(&staged).await;
            return Err(map_not_found(e, from));
        }
        self.publish(&staged, to, overwrite).await
    }

    async fn rename(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        let source = self.resolve(from)?;
        self.stat(from).await?;

        self.place(&source, to, overwrite, Placement::Move).await?;
        self.prune_empty_parents(&source).await;
        Ok(())
    }

    async fn delete(&self, path: &ObjectPath) -> StoreResult<()> {
        self.stat(path).await?;
        let file = self.resolve(path)?;
        fs::remove_file(&file)
            .await
            .map_err(|e| map_not_found(e, path))?;
        self.prune_empty_parents(&file).await;
        Ok(())
    }
}
