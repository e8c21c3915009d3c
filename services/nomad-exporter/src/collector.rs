//! Per-scrape Nomad collection.
//!
//! Each scrape lists allocations, keeps the running ones and enriches every
//! one of them concurrently with its allocation and node records:
//!
//! ```text
//! list ──> filter(running) ──┬─> unit(a1): get_allocation ─> get_node ─┐
//!                            ├─> unit(a2): get_allocation ─> get_node ─┼─> samples
//!                            └─> unit(aN): ...                         ┘
//! ```
//!
//! Units push finished samples onto a channel drained by the cycle once every
//! unit has completed. A failed lookup only drops that allocation's sample.
//! Nothing is carried between scrapes.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn, Instrument};

use crate::client::{Allocation, Node, SchedulerApi};
use crate::filter::{allocations_by_status, RUNNING};
use crate::metrics::{Collector, MetricDesc, MetricSample, ALLOCATION_MEMORY_LIMIT, UP};

/// Collector backed by the Nomad API.
pub struct NomadCollector {
    api: Arc<dyn SchedulerApi>,
    max_concurrency: usize,
}

impl NomadCollector {
    /// Create a collector with unbounded fan-out.
    pub fn new(api: Arc<dyn SchedulerApi>) -> Self {
        Self {
            api,
            max_concurrency: 0,
        }
    }

    /// Cap the number of allocations enriched at once. Zero disables the cap.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

#[async_trait]
impl Collector for NomadCollector {
    fn describe(&self) -> Vec<&'static MetricDesc> {
        vec![&UP, &ALLOCATION_MEMORY_LIMIT]
    }

    async fn collect(&self) -> Vec<MetricSample> {
        let started = Instant::now();

        // Reports exporter liveness; a failed list below does not flip it.
        let mut samples = vec![MetricSample::gauge(&UP, Vec::new(), 1.0)];

        let allocations = match self.api.list_allocations().await {
            Ok(allocations) => allocations,
            Err(e) => {
                error!(error = %e, "Query error: failed to list allocations");
                return samples;
            }
        };

        let total = allocations.len();
        let running = allocations_by_status(allocations, RUNNING);
        let running_count = running.len();

        let limiter = (self.max_concurrency > 0)
            .then(|| Arc::new(Semaphore::new(self.max_concurrency)));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut units = JoinSet::new();

        for stub in running {
            let api = Arc::clone(&self.api);
            let tx = tx.clone();
            let limiter = limiter.clone();
            let span = tracing::debug_span!("enrich", alloc_id = %stub.id);

            units.spawn(
                async move {
                    let _permit = match limiter {
                        Some(limiter) => match limiter.acquire_owned().await {
                            Ok(permit) => Some(permit),
                            Err(_) => return,
                        },
                        None => None,
                    };

                    if let Some(sample) = enrich_allocation(api.as_ref(), &stub.id).await {
                        // The receiver outlives every unit.
                        let _ = tx.send(sample);
                    }
                }
                .instrument(span),
            );
        }
        drop(tx);

        while let Some(result) = units.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Allocation enrichment task failed");
            }
        }

        let mut emitted = 0usize;
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
            emitted += 1;
        }

        debug!(
            allocations = total,
            running = running_count,
            emitted,
            dropped = running_count - emitted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collection cycle complete"
        );

        samples
    }
}

/// Look up an allocation and its node and build the memory-limit sample.
///
/// Returns `None` (after logging) if either lookup fails.
pub async fn enrich_allocation(api: &dyn SchedulerApi, alloc_id: &str) -> Option<MetricSample> {
    let alloc = match api.get_allocation(alloc_id).await {
        Ok(alloc) => alloc,
        Err(e) => {
            warn!(alloc_id = %alloc_id, error = %e, "Query error: allocation lookup failed");
            return None;
        }
    };

    let node = match api.get_node(&alloc.node_id).await {
        Ok(node) => node,
        Err(e) => {
            warn!(
                alloc_id = %alloc_id,
                node_id = %alloc.node_id,
                error = %e,
                "Query error: node lookup failed"
            );
            return None;
        }
    };

    Some(memory_limit_sample(&alloc, &node))
}

/// Build the memory-limit sample for an allocation placed on `node`.
pub fn memory_limit_sample(alloc: &Allocation, node: &Node) -> MetricSample {
    MetricSample::gauge(
        &ALLOCATION_MEMORY_LIMIT,
        vec![
            alloc.job.name.clone(),
            alloc.task_group.clone(),
            alloc.name.clone(),
            alloc.id.clone(),
            alloc.job.region.clone(),
            node.datacenter.clone(),
            node.name.clone(),
        ],
        alloc.resources.memory_mb as f64,
    )
}
