//! In-memory backend
//!
//! Keeps every object in a `BTreeMap` keyed by path, so listings come out in
//! lexicographic order for free. ETags and version ids come from a single
//! monotonically increasing counter. All state sits behind one lock that is
//! never held across an await point, which makes every call atomic.

use super::types::{AdapterCapabilities, FetchRequest, FetchResponse, ListRequest};
use super::BackendAdapter;
use crate::error::{StoreError, StoreResult};
use crate::path::ObjectPath;
use crate::types::{Attributes, Buffer, ListPage, ObjectMeta, PartToken, PutResult, TagSet};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use storekit_core_precondition::{evaluate_put, Destination, PutMode};

const BACKEND: &str = "memory";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Buffer,
    meta: ObjectMeta,
    attributes: Attributes,
    tags: TagSet,
}

#[derive(Debug)]
struct PendingUpload {
    path: ObjectPath,
    attributes: Attributes,
    tags: TagSet,
    parts: BTreeMap<u32, Buffer>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    counter: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn destination(&self, path: &ObjectPath) -> Destination {
        match self.objects.get(path.as_str()) {
            Some(object) => Destination::Present(object.meta.current_version()),
            None => Destination::Absent,
        }
    }

    /// Store `data` at `path` with a fresh ETag and version
    fn insert(
        &mut self,
        path: &ObjectPath,
        data: Buffer,
        attributes: Attributes,
        tags: TagSet,
    ) -> PutResult {
        let id = self.next_id();
        let e_tag = format!("\"{:016x}\"", id);
        let version = id.to_string();

        let meta = ObjectMeta {
            path: path.clone(),
            last_modified: Utc::now(),
            size: data.len() as u64,
            e_tag: Some(e_tag.clone()),
            version: Some(version.clone()),
        };

        self.objects.insert(
            path.as_str().to_string(),
            StoredObject {
                data,
                meta,
                attributes,
                tags,
            },
        );

        PutResult {
            e_tag: Some(e_tag),
            version: Some(version),
        }
    }
}

/// Backend that keeps objects in process memory
///
/// Cloning the adapter shares the underlying storage.
///
/// # Example
///
/// ```
/// use storekit::backend::MemoryAdapter;
///
/// let adapter = MemoryAdapter::new().with_page_size(100);
/// assert_eq!(adapter.len(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    state: Arc<RwLock<MemoryState>>,
    page_size: Option<usize>,
    capabilities: AdapterCapabilities,
}

impl MemoryAdapter {
    /// Create an empty store with every atomic primitive available
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            page_size: None,
            capabilities: AdapterCapabilities {
                atomic_copy_if_not_exists: true,
                native_rename: true,
                conditional_update: true,
            },
        }
    }

    /// Cap listing pages at `page_size` entries regardless of the request
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Behave like a backend without native rename
    pub fn without_native_rename(mut self) -> Self {
        self.capabilities.native_rename = false;
        self
    }

    /// Behave like a backend without atomic copy-if-not-exists
    pub fn without_atomic_create(mut self) -> Self {
        self.capabilities.atomic_copy_if_not_exists = false;
        self
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.read().map(|s| s.objects.len()).unwrap_or(0)
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of multipart sessions neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.read().map(|s| s.uploads.len()).unwrap_or(0)
    }

    /// Tags attached to an object
    pub fn tags(&self, path: &ObjectPath) -> StoreResult<TagSet> {
        let state = self.read()?;
        state
            .objects
            .get(path.as_str())
            .map(|o| o.tags.clone())
            .ok_or_else(|| not_found(path))
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StoreError::backend(BACKEND, "Poisoned", "state lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StoreError::backend(BACKEND, "Poisoned", "state lock poisoned"))
    }

    fn lookup(&self, path: &ObjectPath, request: &FetchRequest) -> StoreResult<StoredObject> {
        let state = self.read()?;
        let object = state
            .objects
            .get(path.as_str())
            .ok_or_else(|| not_found(path))?;

        if let Some(version) = &request.version {
            if object.meta.version.as_deref() != Some(version.as_str()) {
                return Err(not_found(path));
            }
        }

        Ok(object.clone())
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(path: &ObjectPath) -> StoreError {
    StoreError::NotFound {
        path: path.to_string(),
        backend: BACKEND.to_string(),
    }
}

fn no_such_upload(upload_id: &str) -> StoreError {
    StoreError::backend(
        BACKEND,
        "NoSuchUpload",
        format!("upload {} does not exist", upload_id),
    )
}

#[async_trait]
impl BackendAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        BACKEND
    }

    fn capabilities(&self) -> AdapterCapabilities {
        self.capabilities
    }

    async fn fetch(&self, path: &ObjectPath, request: FetchRequest) -> StoreResult<FetchResponse> {
        let object = self.lookup(path, &request)?;

        request
            .conditions
            .check(&object.meta.current_version())
            .map_err(|e| StoreError::from_precondition(e, path.as_str(), BACKEND))?;

        if request.head {
            return Ok(FetchResponse::head(object.meta, object.attributes));
        }

        let range = match &request.range {
            Some(range) => range
                .resolve(object.meta.size)
                .map_err(|reason| StoreError::InvalidRange {
                    path: path.to_string(),
                    reason,
                })?,
            None => 0..object.meta.size,
        };

        let body = object.data.slice(range.start as usize..range.end as usize);
        Ok(FetchResponse::from_buffer(
            object.meta,
            range,
            object.attributes,
            body,
        ))
    }

    async fn upload_full(
        &self,
        path: &ObjectPath,
        bytes: Buffer,
        mode: &PutMode,
        attributes: &Attributes,
        tags: &TagSet,
    ) -> StoreResult<PutResult> {
        let mut state = self.write()?;
        evaluate_put(mode, &state.destination(path))
            .map_err(|e| StoreError::from_precondition(e, path.as_str(), BACKEND))?;
        Ok(state.insert(path, bytes, attributes.clone(), tags.clone()))
    }

    async fn create_multipart(
        &self,
        path: &ObjectPath,
        attributes: &Attributes,
        tags: &TagSet,
    ) -> StoreResult<String> {
        let mut state = self.write()?;
        let upload_id = format!("upload-{}", state.next_id());
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                path: path.clone(),
                attributes: attributes.clone(),
                tags: tags.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        path: &ObjectPath,
        upload_id: &str,
        index: u32,
        bytes: Buffer,
    ) -> StoreResult<PartToken> {
        let mut state = self.write()?;
        let content_id = format!("part-{:016x}", state.next_id());
        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|u| &u.path == path)
            .ok_or_else(|| no_such_upload(upload_id))?;

        let size = bytes.len() as u64;
        upload.parts.insert(index, bytes);
        Ok(PartToken {
            index,
            content_id,
            size,
        })
    }

    async fn complete_multipart(
        &self,
        path: &ObjectPath,
        upload_id: &str,
        mut parts: Vec<PartToken>,
    ) -> StoreResult<PutResult> {
        let mut state = self.write()?;
        let upload = state
            .uploads
            .remove(upload_id)
            .filter(|u| &u.path == path)
            .ok_or_else(|| no_such_upload(upload_id))?;

        parts.sort_by_key(|p| p.index);
        let total: u64 = parts.iter().map(|p| p.size).sum();
        let mut assembled = BytesMut::with_capacity(total as usize);
        for token in &parts {
            let part = upload.parts.get(&token.index).ok_or_else(|| {
                StoreError::backend(
                    BACKEND,
                    "InvalidPart",
                    format!("part {} was never uploaded", token.index),
                )
            })?;
            assembled.extend_from_slice(part);
        }

        Ok(state.insert(path, assembled.freeze(), upload.attributes, upload.tags))
    }

    async fn abort_multipart(&self, _path: &ObjectPath, upload_id: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        state
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| no_such_upload(upload_id))
    }

    async fn list_page(&self, request: ListRequest) -> StoreResult<ListPage> {
        let limit = match self.page_size {
            Some(cap) => request.max_results.clamp(1, cap),
            None => request.max_results.max(1),
        };

        // Resume strictly after whichever of offset/token is further along
        let after = match (&request.offset, &request.token) {
            (Some(o), Some(t)) => Some(o.max(t).clone()),
            (Some(o), None) => Some(o.clone()),
            (None, Some(t)) => Some(t.clone()),
            (None, None) => None,
        };
        let lower = match &after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };

        let state = self.read()?;
        let prefix = request.prefix.as_deref().unwrap_or("");
        let mut matching = state
            .objects
            .range::<String, _>((lower, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(_, object)| object.meta.clone());

        let objects: Vec<ObjectMeta> = matching.by_ref().take(limit).collect();
        let next_token = match matching.next() {
            Some(_) => objects.last().map(|m| m.path.to_string()),
            None => None,
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        if !overwrite && !self.capabilities.atomic_copy_if_not_exists {
            return Err(StoreError::NotSupported {
                backend: BACKEND.to_string(),
                operation: "copy_if_not_exists".to_string(),
            });
        }

        let mut state = self.write()?;
        let source = state
            .objects
            .get(from.as_str())
            .cloned()
            .ok_or_else(|| not_found(from))?;

        if !overwrite && state.objects.contains_key(to.as_str()) {
            return Err(StoreError::AlreadyExists {
                path: to.to_string(),
            });
        }

        state.insert(to, source.data, source.attributes, source.tags);
        Ok(())
    }

    async fn rename(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        if !self.capabilities.native_rename {
            return Err(StoreError::NotSupported {
                backend: BACKEND.to_string(),
                operation: "rename".to_string(),
            });
        }

        let mut state = self.write()?;
        if !state.objects.contains_key(from.as_str()) {
            return Err(not_found(from));
        }
        if !overwrite && state.objects.contains_key(to.as_str()) {
            return Err(StoreError::AlreadyExists {
                path: to.to_string(),
            });
        }

        if let Some(mut object) = state.objects.remove(from.as_str()) {
            object.meta.path = to.clone();
            state.objects.insert(to.as_str().to_string(), object);
        }
        Ok(())
    }

    async fn delete(&self, path: &ObjectPath) -> StoreResult<()> {
        let mut state = self.write()?;
        state
            .objects
            .remove(path.as_str())
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}
