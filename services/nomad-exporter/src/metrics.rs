//! Exported metric descriptors and the scrape-time collection contract.
//!
//! Descriptors are static so the exposition can describe every metric even
//! before Nomad has been queried. Samples are produced fresh on every scrape
//! and rendered through a throwaway [`prometheus::Registry`], alongside the
//! exporter's own `process_*` metrics on Linux.

use std::collections::HashMap;

use async_trait::async_trait;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

/// Description of an exported gauge.
#[derive(Debug, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

pub static UP: MetricDesc = MetricDesc {
    name: "nomad_up",
    help: "Was the last query of Nomad successful.",
    labels: &[],
};

pub static ALLOCATION_MEMORY_LIMIT: MetricDesc = MetricDesc {
    name: "nomad_allocation_memory_limit",
    help: "Allocation memory limit",
    labels: &[
        "job",
        "group",
        "alloc",
        "alloc_id",
        "region",
        "datacenter",
        "node",
    ],
};

/// A single gauge value with its label values, in descriptor label order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub desc: &'static MetricDesc,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl MetricSample {
    pub fn gauge(desc: &'static MetricDesc, label_values: Vec<String>, value: f64) -> Self {
        debug_assert_eq!(desc.labels.len(), label_values.len());
        Self {
            desc,
            label_values,
            value,
        }
    }

    /// Look up a label value by name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .labels
            .iter()
            .position(|label| *label == name)
            .and_then(|idx| self.label_values.get(idx))
            .map(String::as_str)
    }
}

/// Scrape-time metrics source.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Every metric this collector can emit.
    fn describe(&self) -> Vec<&'static MetricDesc>;

    /// Gather the current samples. Runs once per scrape.
    async fn collect(&self) -> Vec<MetricSample>;
}

/// Render samples in the Prometheus text exposition format.
///
/// Samples whose descriptor is not in `descs` are ignored.
pub fn encode_text(
    descs: &[&'static MetricDesc],
    samples: &[MetricSample],
) -> prometheus::Result<String> {
    let registry = Registry::new();
    register_process_metrics(&registry)?;

    let mut gauges: HashMap<&'static str, GaugeVec> = HashMap::with_capacity(descs.len());

    for desc in descs {
        let gauge = GaugeVec::new(Opts::new(desc.name, desc.help), desc.labels)?;
        registry.register(Box::new(gauge.clone()))?;
        gauges.insert(desc.name, gauge);
    }

    for sample in samples {
        let Some(gauge) = gauges.get(sample.desc.name) else {
            continue;
        };
        let values: Vec<&str> = sample.label_values.iter().map(String::as_str).collect();
        gauge.get_metric_with_label_values(&values)?.set(sample.value);
    }

    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&registry.gather(), &mut buf)?;
    String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Standard `process_*` metrics for the exporter itself (CPU, memory, fds).
fn register_process_metrics(registry: &Registry) -> prometheus::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use prometheus::process_collector::ProcessCollector;
        registry.register(Box::new(ProcessCollector::for_self()))?;
    }
    #[cfg(not(target_os = "linux"))]
    let _ = registry;

    Ok(())
}

/// Content type of [`encode_text`] output.
pub fn text_content_type() -> String {
    TextEncoder::new().format_type().to_string()
}
