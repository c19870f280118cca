//! Per-domain concurrency gates.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::urls::host_of;

/// Registry of per-host bounded counters. Entries are created lazily under
/// a mutex held only for the map lookup; the semaphore wait happens outside
/// it. Nothing is evicted during a run.
#[derive(Debug)]
pub struct DomainGates {
    max_per_domain: usize,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl DomainGates {
    pub fn new(max_per_domain: usize) -> Self {
        Self {
            max_per_domain: max_per_domain.max(1),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// The gate for a URL's host, created on first use.
    pub async fn gate_for(&self, url: &str) -> Arc<Semaphore> {
        let host = host_of(url);
        let mut gates = self.gates.lock().await;
        Arc::clone(
            gates
                .entry(host)
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_domain))),
        )
    }

    /// Acquire a slot for the URL's host, waiting outside the registry lock.
    pub async fn acquire(&self, url: &str) -> OwnedSemaphorePermit {
        let gate = self.gate_for(url).await;
        gate.acquire_owned()
            .await
            .expect("domain gate semaphore closed")
    }

    /// Number of hosts seen so far.
    pub async fn len(&self) -> usize {
        self.gates.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.gates.lock().await.is_empty()
    }
}
