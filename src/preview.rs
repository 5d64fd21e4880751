use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::blob::{BlobId, ImageBlob};

/// Identity of an allocated preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewId(Uuid);

impl PreviewId {
    /// URL a renderer uses to show the image
    pub fn url(&self) -> String {
        format!("preview://{}", self.0)
    }
}

impl fmt::Display for PreviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Allocation counters for leak checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreviewStats {
    pub allocated: u64,
    pub revoked: u64,
    pub live: usize,
}

/// Number of recent revocations kept for inspection
pub const REVOCATION_HISTORY: usize = 64;

#[derive(Debug, Default)]
struct RegistryInner {
    live: HashMap<PreviewId, BlobId>,
    recent_revocations: VecDeque<PreviewId>,
    allocated: u64,
    revoked: u64,
}

/// Hands out preview handles and counts every revocation
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a renderable reference to the blob's bytes
    pub fn allocate(&self, blob: &ImageBlob) -> PreviewHandle {
        let id = PreviewId(Uuid::new_v4());
        {
            let mut inner = self.inner.lock();
            inner.live.insert(id, blob.id());
            inner.allocated += 1;
        }

        debug!("Allocated preview {} for blob {}", id, blob.id());

        PreviewHandle {
            id,
            blob: blob.id(),
            data: blob.data().clone(),
            media_type: blob.media_type().to_string(),
            registry: Arc::clone(&self.inner),
        }
    }

    pub fn stats(&self) -> PreviewStats {
        let inner = self.inner.lock();
        PreviewStats {
            allocated: inner.allocated,
            revoked: inner.revoked,
            live: inner.live.len(),
        }
    }

    pub fn is_live(&self, id: PreviewId) -> bool {
        self.inner.lock().live.contains_key(&id)
    }

    /// Most recent revocations, oldest first, at most `REVOCATION_HISTORY`
    pub fn revocations(&self) -> Vec<PreviewId> {
        self.inner.lock().recent_revocations.iter().copied().collect()
    }

    /// Blob a live preview points at
    pub fn resolve(&self, id: PreviewId) -> Option<BlobId> {
        self.inner.lock().live.get(&id).copied()
    }
}

/// Revocable reference to an image for rendering.
///
/// Not `Clone`: revoking consumes the handle and dropping it revokes, so each
/// handle is revoked exactly once.
pub struct PreviewHandle {
    id: PreviewId,
    blob: BlobId,
    data: Bytes,
    media_type: String,
    registry: Arc<Mutex<RegistryInner>>,
}

impl PreviewHandle {
    pub fn id(&self) -> PreviewId {
        self.id
    }

    pub fn url(&self) -> String {
        self.id.url()
    }

    pub fn blob(&self) -> BlobId {
        self.blob
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn revoke(self) {
        drop(self);
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("id", &self.id)
            .field("blob", &self.blob)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        let mut inner = self.registry.lock();
        if inner.live.remove(&self.id).is_some() {
            inner.revoked += 1;
            if inner.recent_revocations.len() == REVOCATION_HISTORY {
                inner.recent_revocations.pop_front();
            }
            inner.recent_revocations.push_back(self.id);
            debug!("Revoked preview {}", self.id);
        } else {
            warn!("Preview {} was not live when revoked", self.id);
        }
    }
}
