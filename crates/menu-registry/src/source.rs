//! Metadata source trait.
//!
//! The deduplicator talks to the metadata endpoint only through this trait,
//! so tests can swap the HTTP client for an in-memory source.

use crate::error::{RegistryError, RegistryResult};
use menu_core::{ItemId, MetadataRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Request/response access to item metadata, keyed by id.
pub trait MetadataSource: Send + Sync {
    /// Fetch the metadata record for one item.
    ///
    /// A missing record is `RegistryError::NotFound`, never a panic.
    fn fetch(&self, id: ItemId) -> BoxFuture<'_, RegistryResult<MetadataRecord>>;
}

/// Arc wrapper for MetadataSource trait objects.
pub type DynMetadataSource = Arc<dyn MetadataSource>;

/// Scripted failure for `MockMetadataSource`.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Respond with `RegistryError::NotFound`.
    NotFound,
    /// Respond with an HTTP status error.
    Status(u16),
    /// Never respond.
    Hang,
}

/// In-memory metadata source for testing.
#[derive(Debug, Default)]
pub struct MockMetadataSource {
    records: Mutex<HashMap<ItemId, MetadataRecord>>,
    failures: Mutex<HashMap<ItemId, MockFailure>>,
    delay: Mutex<Duration>,
    /// Every requested id, in call order.
    calls: Mutex<Vec<ItemId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = MetadataRecord>) -> Self {
        let source = Self::new();
        for record in records {
            source.insert(record);
        }
        source
    }

    pub fn insert(&self, record: MetadataRecord) {
        self.records.lock().insert(record.id.clone(), record);
    }

    pub fn fail(&self, id: impl Into<ItemId>, failure: MockFailure) {
        self.failures.lock().insert(id.into(), failure);
    }

    pub fn clear_failure(&self, id: &ItemId) {
        self.failures.lock().remove(id);
    }

    /// Delay applied to every response.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<ItemId> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of requests made for one id.
    pub fn calls_for(&self, id: &ItemId) -> usize {
        self.calls.lock().iter().filter(|c| *c == id).count()
    }

    /// Highest number of requests observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MetadataSource for MockMetadataSource {
    fn fetch(&self, id: ItemId) -> BoxFuture<'_, RegistryResult<MetadataRecord>> {
        Box::pin(async move {
            self.calls.lock().push(id.clone());
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            let _in_flight = InFlight(&self.in_flight);

            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let failure = self.failures.lock().get(&id).cloned();
            match failure {
                Some(MockFailure::NotFound) => return Err(RegistryError::NotFound(id)),
                Some(MockFailure::Status(status)) => {
                    return Err(RegistryError::HttpStatus {
                        status,
                        body: "mock failure".to_string(),
                    })
                }
                Some(MockFailure::Hang) => std::future::pending::<()>().await,
                None => {}
            }

            self.records
                .lock()
                .get(&id)
                .cloned()
                .ok_or(RegistryError::NotFound(id))
        })
    }
}
