//! Prometheus side of the exporter.
//!
//! Every collector re-runs its Slurm commands on each scrape, there is no background polling and
//! nothing is served from a cache.

use std::{
    fmt,
    sync::{atomic::AtomicU64, Arc, Mutex},
};

use collector_data::{
    collect_entity_totals, collect_job_assignments,
    job::JobAssignment,
    queue::{EntityKind, EntityTotals},
    slurm::SlurmSource,
};
use color_eyre::{eyre::Context as _, Result};
use itertools::Itertools as _;
use prometheus_client::{
    collector::Collector,
    encoding::{text::encode, DescriptorEncoder, EncodeLabelSet, EncodeMetric as _},
    metrics::{
        family::Family,
        gauge::{ConstGauge, Gauge},
        MetricType,
    },
    registry::Registry,
};
use tracing::{debug, error, instrument};

use crate::config::Collectors;

pub type SharedSource = Arc<dyn SlurmSource>;

/// Metric name suffix and help text prefix, in the order of [`entity_values`].
const ENTITY_GAUGES: [(&str, &str); 6] = [
    ("jobs_pending", "Pending jobs"),
    ("jobs_running", "Running jobs"),
    ("cpus_running", "Running cpus"),
    ("gpus_running", "Running gpus"),
    ("mem_running", "Running mem in GB"),
    ("jobs_suspended", "Suspended jobs"),
];

fn entity_values(totals: &EntityTotals) -> [f64; 6] {
    [
        totals.pending as f64,
        totals.running as f64,
        totals.running_cpus,
        totals.running_gpus,
        totals.running_mem_gb,
        totals.suspended as f64,
    ]
}

/// `slurm_account_*` or `slurm_user_*` gauges, rebuilt from a fresh queue dump on every scrape.
pub struct EntityCollector {
    kind: EntityKind,
    source: SharedSource,
}

impl EntityCollector {
    pub fn new(kind: EntityKind, source: SharedSource) -> Self {
        EntityCollector { kind, source }
    }
}

impl fmt::Debug for EntityCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCollector").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl Collector for EntityCollector {
    #[instrument(skip_all, fields(kind = %self.kind))]
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), fmt::Error> {
        let totals = collect_entity_totals(&*self.source, self.kind).map_err(|e| {
            error!("collecting {} metrics failed: {e:?}", self.kind);
            fmt::Error
        })?;

        let label = self.kind.to_string();
        let rows = totals.iter().map(|(entity, totals)| (entity, entity_values(totals))).collect_vec();

        for (idx, (suffix, help)) in ENTITY_GAUGES.iter().enumerate() {
            let name = format!("slurm_{}_{suffix}", self.kind);
            let help = format!("{help} for {}", self.kind);
            let mut metric = encoder.encode_descriptor(&name, &help, None, MetricType::Gauge)?;
            // zero values are left out, a missing series reads as 0 anyway
            for (entity, values) in rows.iter().filter(|(_, values)| values[idx] > 0.0) {
                let labels = [(label.as_str(), entity.as_str())];
                ConstGauge::new(values[idx]).encode(metric.encode_family(&labels)?)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct JobLabels {
    user: String,
    account: String,
    hostname: String,
    state: String,
    jobid: String,
}

impl From<&JobAssignment> for JobLabels {
    fn from(row: &JobAssignment) -> Self {
        JobLabels {
            user: row.user.clone(),
            account: row.account.clone(),
            hostname: row.hostname.clone(),
            state: row.state.clone(),
            jobid: row.job_id.clone(),
        }
    }
}

type JobFamily = Family<JobLabels, Gauge<f64, AtomicU64>>;

#[derive(Debug, Default)]
struct JobFamilies {
    cpus: JobFamily,
    gpus: JobFamily,
    mems: JobFamily,
}

impl JobFamilies {
    fn clear(&self) {
        self.cpus.clear();
        self.gpus.clear();
        self.mems.clear();
    }

    fn set(&self, row: &JobAssignment) {
        let labels = JobLabels::from(row);
        self.cpus.get_or_create(&labels).set(row.cpus);
        self.gpus.get_or_create(&labels).set(row.gpus);
        self.mems.get_or_create(&labels).set(row.mem);
    }
}

/// `slurm_job_{cpus,gpus,mems}` per job and node.
pub struct JobCollector {
    source: SharedSource,
    /// Held for a whole scrape so two concurrent scrapes can't mix their rows.
    families: Mutex<JobFamilies>,
}

impl JobCollector {
    pub fn new(source: SharedSource) -> Self {
        JobCollector {
            source,
            families: Mutex::default(),
        }
    }
}

impl fmt::Debug for JobCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCollector").finish_non_exhaustive()
    }
}

impl Collector for JobCollector {
    #[instrument(skip_all)]
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), fmt::Error> {
        let families = self.families.lock().map_err(|_| {
            error!("job metric families are poisoned");
            fmt::Error
        })?;
        families.clear();

        let report = collect_job_assignments(&*self.source).map_err(|e| {
            error!("collecting job metrics failed: {e:?}");
            fmt::Error
        })?;
        report.assignments.iter().for_each(|row| families.set(row));
        debug!(rows = report.assignments.len(), "updated job metrics");

        for (name, help, family) in [
            ("slurm_job_cpus", "Total cpu of a job", &families.cpus),
            ("slurm_job_gpus", "Total gpu of a job", &families.gpus),
            ("slurm_job_mems", "Total mem of a job", &families.mems),
        ] {
            family.encode(encoder.encode_descriptor(name, help, None, MetricType::Gauge)?)?;
        }

        let skipped = encoder.encode_descriptor(
            "slurm_job_detail_parse_errors",
            "Job detail records skipped because a required field was missing",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(report.skipped.len() as i64).encode(skipped)?;
        Ok(())
    }
}

/// A registry with the collectors enabled in `collectors`, all reading from `source`.
pub fn build_registry(collectors: &Collectors, source: SharedSource) -> Registry {
    let mut registry = Registry::default();
    if collectors.accounts {
        registry.register_collector(Box::new(EntityCollector::new(EntityKind::Account, Arc::clone(&source))));
    }
    if collectors.users {
        registry.register_collector(Box::new(EntityCollector::new(EntityKind::User, Arc::clone(&source))));
    }
    if collectors.jobs {
        registry.register_collector(Box::new(JobCollector::new(source)));
    }
    registry
}

/// Run one scrape and render it as OpenMetrics text. Blocks while the Slurm commands run.
pub fn render(registry: &Registry) -> Result<String> {
    let mut exposition = String::new();
    encode(&mut exposition, registry).wrap_err("encoding metrics (see log for the collector error)")?;
    Ok(exposition)
}
