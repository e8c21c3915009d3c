//! Nomad Prometheus exporter.
//!
//! On every scrape the exporter queries the Nomad HTTP API and republishes
//! allocation facts as gauges:
//!
//! - `nomad_up`: always 1 while the exporter is serving
//! - `nomad_allocation_memory_limit`: memory limit (MB) of each running
//!   allocation, labeled with its job, group, region, datacenter and node
//!
//! ## Modules
//!
//! - `client`: typed Nomad API client and the `SchedulerApi` trait
//! - `filter`: allocation selection by client status
//! - `collector`: per-scrape fan-out over running allocations
//! - `metrics`: metric descriptors, the `Collector` trait and text encoding
//! - `api`: HTTP routes

pub mod api;
pub mod client;
pub mod collector;
pub mod config;
pub mod filter;
pub mod metrics;

pub use client::{ClientError, NomadClient, SchedulerApi};
pub use collector::NomadCollector;
pub use config::{Args, Config};
pub use metrics::{Collector, MetricDesc, MetricSample};
