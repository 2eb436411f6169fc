//! `scontrol show job -d -o` parsing.
//!
//! Every job is one (long) line of `Key=Value` tokens. Besides the job wide fields, the detailed
//! output carries one allocation group per set of identically allocated nodes:
//!
//! ```text
//! JobId=55 JobName=train UserId=bob(1000) GroupId=bob(1000) ... Account=acct2 ... JobState=RUNNING ...
//!    JOB_GRES=gpu:2 Nodes=node[01-02] CPU_IDs=0-3 Mem=8000 GRES=gpu:1(IDX:0) MinCPUsNode=1 ...
//! ```
//!
//! Each group is expanded to one [`JobAssignment`] per host. The group's resources are copied to
//! every host as they are, `scontrol` already reports them per node.

use color_eyre::{eyre::Context as _, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    node::{expand_nodelist, HostnameExpander},
    tres::Resources,
};

/// Lines this short can't be a job record (stray whitespace and the like).
const MIN_RECORD_LEN: usize = 10;
const NO_JOBS: &str = "No jobs in the system";

static JOB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\s)JobId=(\d+)").expect("JobId regex should be valid"));
static USER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)UserId=([^\s(]+)").expect("UserId regex should be valid"));
static ACCOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)Account=(\S+)").expect("Account regex should be valid"));
static JOB_STATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)JobState=(\S+)").expect("JobState regex should be valid"));
static NODES_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\sNodes=").expect("Nodes regex should be valid"));
static NODES: Lazy<Regex> = Lazy::new(|| Regex::new(r"Nodes=(\S+)").expect("Nodes regex should be valid"));

/// A job record lacked one of the fields every exported row is labelled with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetailParseError {
    #[error("line {line}: required tag `{tag}=` not found")]
    MissingTag { line: usize, tag: &'static str },
}

/// The job wide fields of a detailed job record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHeader {
    pub job_id: String,
    pub user: String,
    pub account: String,
    /// As reported, e.g. `RUNNING`.
    pub state: String,
}

impl JobHeader {
    /// `line` is the 1-based line number, only used for error reporting.
    pub fn parse(record: &str, line: usize) -> Result<Self, DetailParseError> {
        let required = |re: &Regex, tag: &'static str| {
            re.captures(record)
                .map(|caps| caps[1].to_owned())
                .ok_or(DetailParseError::MissingTag { line, tag })
        };

        Ok(JobHeader {
            job_id: required(&JOB_ID, "JobId")?,
            user: required(&USER_ID, "UserId")?,
            account: required(&ACCOUNT, "Account")?,
            state: required(&JOB_STATE, "JobState")?,
        })
    }
}

/// One allocation group (`Nodes=… CPU_IDs=… Mem=… GRES=…`) of a job record.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation<'a> {
    pub nodelist: &'a str,
    pub resources: Resources,
}

/// All allocation groups of a job record, in order. Pending jobs have none.
///
/// A group starts at a `Nodes=` token and runs up to the next one (or the end of the record), so
/// its `GRES=` token is always part of it.
pub fn allocations(record: &str) -> Vec<Allocation<'_>> {
    let starts: Vec<usize> = NODES_TAG.find_iter(record).map(|m| m.start()).collect();
    let ends = starts.iter().skip(1).copied().chain(std::iter::once(record.len()));

    starts
        .iter()
        .zip(ends)
        .filter_map(|(&start, end)| {
            let fragment = &record[start..end];
            let nodelist = NODES.captures(fragment)?.get(1)?.as_str();
            Some(Allocation {
                nodelist,
                resources: Resources::from_allocation(fragment),
            })
        })
        .collect()
}

/// What one job allocates on one node.
#[derive(Debug, Clone, PartialEq)]
pub struct JobAssignment {
    pub job_id: String,
    pub user: String,
    pub account: String,
    pub state: String,
    pub hostname: String,
    pub cpus: f64,
    pub gpus: f64,
    pub mem: f64,
}

/// Result of parsing a whole detail dump.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailReport {
    /// One row per (job, node), in dump order.
    pub assignments: Vec<JobAssignment>,
    /// Records that were dropped because a required tag was missing.
    pub skipped: Vec<DetailParseError>,
}

/// Parse a full `scontrol show job -d -o` dump.
///
/// A record missing a required tag is skipped and reported in [`DetailReport::skipped`], the rest
/// of the dump is still parsed. Failing to expand a nodelist aborts the whole parse: that is a
/// broken `scontrol`, not a broken record.
#[tracing::instrument(level = "debug", skip_all)]
pub fn parse_detail<E>(input: &str, expander: &E) -> Result<DetailReport>
where
    E: HostnameExpander + ?Sized,
{
    let mut report = DetailReport::default();

    for (idx, record) in input.lines().enumerate() {
        if record.len() <= MIN_RECORD_LEN || record.trim() == NO_JOBS {
            continue;
        }

        let header = match JobHeader::parse(record, idx + 1) {
            Ok(header) => header,
            Err(e) => {
                warn!("skipping job record: {e}");
                report.skipped.push(e);
                continue;
            }
        };

        for allocation in allocations(record) {
            let hostnames = expand_nodelist(allocation.nodelist, expander)
                .wrap_err_with(|| format!("job {}", header.job_id))?;
            report
                .assignments
                .extend(hostnames.into_iter().map(|hostname| JobAssignment {
                    job_id: header.job_id.clone(),
                    user: header.user.clone(),
                    account: header.account.clone(),
                    state: header.state.clone(),
                    hostname,
                    cpus: allocation.resources.cpus,
                    gpus: allocation.resources.gpus,
                    mem: allocation.resources.mem,
                }));
        }
    }

    debug!(
        assignments = report.assignments.len(),
        skipped = report.skipped.len(),
        "parsed job details"
    );
    Ok(report)
}
