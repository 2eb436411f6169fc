use std::process::Command;

use color_eyre::{
    eyre::{eyre, Context as _},
    Result, Section as _, SectionExt as _,
};
use tracing::{instrument, trace};

use crate::{node::HostnameExpander, queue::EntityKind};

/// Where the raw scheduler text comes from.
///
/// [`SlurmCli`] runs the real commands; tests hand in canned dumps.
pub trait SlurmSource: HostnameExpander + Send + Sync {
    /// Queue dump with the entity of `kind` in the second column.
    fn queue(&self, kind: EntityKind) -> Result<String>;

    /// Detailed one-line-per-job dump.
    fn job_details(&self) -> Result<String>;
}

/// The Slurm command line tools on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlurmCli;

impl SlurmCli {
    /// `squeue -a -r -h -O jobid,<entity>,state,tres:100,nodelist`
    pub fn queue_command(kind: EntityKind) -> Command {
        let mut cmd = Command::new("squeue");
        cmd.args(["-a", "-r", "-h", "-O"])
            .arg(format!("jobid,{},state,tres:100,nodelist", kind.squeue_field()));
        cmd
    }

    /// `scontrol show job -d -o`
    pub fn job_details_command() -> Command {
        let mut cmd = Command::new("scontrol");
        cmd.args(["show", "job", "-d", "-o"]);
        cmd
    }

    /// `scontrol show hostnames <nodelist>`
    pub fn hostnames_command(nodelist: &str) -> Command {
        let mut cmd = Command::new("scontrol");
        cmd.args(["show", "hostnames", nodelist]);
        cmd
    }

    /// Whether `scontrol` can be executed at all.
    pub fn is_available() -> bool {
        Command::new("scontrol")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}

impl HostnameExpander for SlurmCli {
    fn hostnames(&self, nodelist: &str) -> Result<String> {
        run(Self::hostnames_command(nodelist))
    }
}

impl SlurmSource for SlurmCli {
    fn queue(&self, kind: EntityKind) -> Result<String> {
        run(Self::queue_command(kind))
    }

    fn job_details(&self) -> Result<String> {
        run(Self::job_details_command())
    }
}

/// Run to completion and return stdout. Blocks for as long as the command does.
#[instrument(level = "debug")]
fn run(mut cmd: Command) -> Result<String> {
    let output = cmd.output().wrap_err_with(|| format!("executing {cmd:?}"))?;

    if !output.status.success() {
        return Err(eyre!("{cmd:?} failed with status {:?}", output.status.code())
            .note(String::from_utf8_lossy(&output.stderr).trim().to_string().header("Stderr:")));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    trace!(bytes = stdout.len(), "command finished");
    Ok(stdout)
}
