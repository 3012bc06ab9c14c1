//! In-flight request registry.
//!
//! # Responsibilities
//! - Map request ids to their live [`InFlightEntry`]
//! - Guarantee each entry is removed exactly once
//! - Cancel every live entry when its connection goes away
//!
//! # Design Decisions
//! - One registry per executor, constructed explicitly and cloned cheaply (Arc)
//! - Removal goes through `DashMap::remove`, so only the first remover gets the entry
//! - The body reader sits behind an async mutex: a second reader serializes
//!   behind the first instead of interleaving reads

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::host::fetcher::BodyReader;
use crate::observability::metrics;
use crate::protocol::{RequestDescriptor, RequestId};

/// Live state for one accepted request.
pub struct InFlightEntry {
    id: RequestId,
    descriptor: RequestDescriptor,
    token: CancellationToken,
    created_at: Instant,
    responded: AtomicBool,
    retired: AtomicBool,
    body: Mutex<Option<Box<dyn BodyReader>>>,
}

impl InFlightEntry {
    fn new(id: RequestId, descriptor: RequestDescriptor) -> Self {
        Self {
            id,
            descriptor,
            token: CancellationToken::new(),
            created_at: Instant::now(),
            responded: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            body: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Token observed by the fetch and by every body read.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// True once the HTTP client produced a response head.
    pub fn has_response(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }

    /// True once the entry has been removed from its registry.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Store the response body handle. `None` means the response has no body.
    pub async fn attach_response(&self, body: Option<Box<dyn BodyReader>>) {
        *self.body.lock().await = body;
        self.responded.store(true, Ordering::Release);
    }

    /// Exclusive access to the body reader.
    pub async fn body(&self) -> MutexGuard<'_, Option<Box<dyn BodyReader>>> {
        self.body.lock().await
    }
}

impl fmt::Debug for InFlightEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightEntry")
            .field("id", &self.id)
            .field("method", &self.descriptor.method)
            .field("url", &self.descriptor.url)
            .field("has_response", &self.has_response())
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Identifier → entry map shared by one executor's flows.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<DashMap<RequestId, Arc<InFlightEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending entry under a freshly generated id.
    pub fn insert(&self, descriptor: RequestDescriptor) -> Arc<InFlightEntry> {
        let entry = Arc::new(InFlightEntry::new(RequestId::generate(), descriptor));
        self.entries.insert(entry.id.clone(), Arc::clone(&entry));
        metrics::record_inflight(self.entries.len());
        entry
    }

    pub fn get(&self, id: &RequestId) -> Option<Arc<InFlightEntry>> {
        self.entries.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Remove an entry. Only the first caller for a given id gets it back.
    pub fn remove(&self, id: &RequestId) -> Option<Arc<InFlightEntry>> {
        let (_, entry) = self.entries.remove(id)?;
        entry.retired.store(true, Ordering::Release);
        metrics::record_inflight(self.entries.len());
        Some(entry)
    }

    /// Remove an entry and cancel its token. Returns false for unknown ids.
    pub fn cancel(&self, id: &RequestId) -> bool {
        match self.remove(id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel and remove every live entry. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<RequestId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.entries.len())
            .finish()
    }
}
