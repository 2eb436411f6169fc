//! Decoding of the resource quantities Slurm prints inline.
//!
//! Two formats show up:
//!
//! + the TRES column of `squeue -O tres`, e.g. `cpu=4,mem=16000M,node=1,billing=4,gres/gpu=1`
//! + the per node allocation groups of `scontrol show job -d`, e.g.
//!   `Nodes=gpu[01-02] CPU_IDs=0-3 Mem=8000 GRES=gpu:1(IDX:0)`
//!
//! Every quantity is optional. A missing or garbled one decodes as `0`, scheduler output drifts
//! between versions and one odd job must not take the whole scrape down.

use once_cell::sync::Lazy;
use regex::Regex;

static TRES_CPU: Lazy<Regex> = Lazy::new(|| Regex::new(r"cpu=(\d+)").expect("TRES cpu regex should be valid"));
// also matches the `gres/gpu=` form
static TRES_GPU: Lazy<Regex> = Lazy::new(|| Regex::new(r"gpu=(\d+)").expect("TRES gpu regex should be valid"));
static TRES_MEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"mem=(\d+)([A-Z])").expect("TRES mem regex should be valid"));

static ALLOC_CPU_IDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CPU_IDs=(\d+)-(\d+)").expect("CPU_IDs regex should be valid"));
static ALLOC_GPU: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"GRES=gpu(?::[^:\s(,]+)?:(\d+)").expect("GRES regex should be valid")
});
static ALLOC_MEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\s)Mem=(\d+)").expect("Mem regex should be valid"));

/// CPU, GPU and memory quantities of a job (or of one allocation group of a job).
///
/// `mem` is in gigabytes when decoded from a TRES string and in whatever unit `scontrol` reports
/// (megabytes) when decoded from an allocation group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Resources {
    pub cpus: f64,
    pub gpus: f64,
    pub mem: f64,
}

impl Resources {
    /// Decode a TRES token like `cpu=4,mem=16000M,gres/gpu=1`.
    ///
    /// Memory with an `M` suffix is divided by 1000, any other suffix is taken as gigabytes.
    pub fn from_tres(tres: &str) -> Self {
        let mem = TRES_MEM
            .captures(tres)
            .and_then(|caps| {
                let value = caps[1].parse::<f64>().ok()?;
                Some(match &caps[2] {
                    "M" => value / 1000.0,
                    _ => value,
                })
            })
            .unwrap_or_default();

        Resources {
            cpus: first_number(&TRES_CPU, tres).unwrap_or_default(),
            gpus: first_number(&TRES_GPU, tres).unwrap_or_default(),
            mem,
        }
    }

    /// Decode one allocation group of a detailed job record.
    ///
    /// The CPU count is the length of the first `CPU_IDs=<start>-<end>` range, GPUs come from a
    /// `GRES=gpu:<n>` token and memory from the bare `Mem=` field (not converted).
    pub fn from_allocation(fragment: &str) -> Self {
        Resources {
            cpus: ALLOC_CPU_IDS
                .captures(fragment)
                .map(|caps| cpu_range_len(&caps[1], &caps[2]))
                .unwrap_or_default(),
            gpus: first_number(&ALLOC_GPU, fragment).unwrap_or_default(),
            mem: first_number(&ALLOC_MEM, fragment).unwrap_or_default(),
        }
    }
}

/// Number of CPUs in the inclusive range `start..=end`. A reversed range counts as zero.
fn cpu_range_len(start: &str, end: &str) -> f64 {
    match (start.parse::<u64>(), end.parse::<u64>()) {
        (Ok(start), Ok(end)) if end >= start => (end - start + 1) as f64,
        _ => 0.0,
    }
}

fn first_number(re: &Regex, haystack: &str) -> Option<f64> {
    re.captures(haystack)?[1].parse().ok()
}

#[allow(non_snake_case)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn Resources__from_tres__full() {
        let res = Resources::from_tres("cpu=4,mem=16G,gpu=1");
        assert_eq!(res, Resources { cpus: 4.0, gpus: 1.0, mem: 16.0 });
    }

    #[test]
    fn Resources__from_tres__megabytes_are_normalized() {
        assert_eq!(Resources::from_tres("cpu=4,mem=16000M,gpu=0").mem, 16.0);
        assert_eq!(Resources::from_tres("mem=500M").mem, 0.5);
        assert_eq!(Resources::from_tres("mem=16G").mem, 16.0);
    }

    #[test]
    fn Resources__from_tres__other_units_pass_through() {
        assert_eq!(Resources::from_tres("mem=2T").mem, 2.0);
    }

    #[test]
    fn Resources__from_tres__gres_gpu() {
        let res = Resources::from_tres("cpu=8,mem=64G,node=1,billing=8,gres/gpu=2");
        assert_eq!(res, Resources { cpus: 8.0, gpus: 2.0, mem: 64.0 });
    }

    #[test]
    fn Resources__from_tres__missing_fields_default_to_zero() {
        assert_eq!(Resources::from_tres("cpu=2"), Resources { cpus: 2.0, gpus: 0.0, mem: 0.0 });
        assert_eq!(Resources::from_tres(""), Resources::default());
        assert_eq!(Resources::from_tres("(null)"), Resources::default());
    }

    #[test]
    fn Resources__from_tres__malformed_fields_default_to_zero() {
        // no unit letter
        assert_eq!(Resources::from_tres("cpu=2,mem=100").mem, 0.0);
        // decimal memory is not understood
        assert_eq!(Resources::from_tres("mem=1.5G").mem, 0.0);
        assert_eq!(Resources::from_tres("cpu=,gpu=x").cpus, 0.0);
    }

    #[test]
    fn Resources__from_allocation__full() {
        let res = Resources::from_allocation(" Nodes=node01 CPU_IDs=0-3 Mem=8000 GRES=gpu:1(IDX:0) ");
        assert_eq!(res, Resources { cpus: 4.0, gpus: 1.0, mem: 8000.0 });
    }

    #[test]
    fn Resources__from_allocation__typed_gres() {
        let res = Resources::from_allocation(" Nodes=node01 CPU_IDs=0-7 Mem=1024 GRES=gpu:a100:2(IDX:0-1)");
        assert_eq!(res.gpus, 2.0);
    }

    #[test]
    fn Resources__from_allocation__missing_fields_default_to_zero() {
        let res = Resources::from_allocation(" Nodes=node01 GRES=");
        assert_eq!(res, Resources::default());
    }

    #[test]
    fn Resources__from_allocation__mem_needs_token_start() {
        assert_eq!(Resources::from_allocation(" Nodes=n1 MinMemoryNode=4000 GRES=").mem, 0.0);
    }

    #[test]
    fn Resources__from_allocation__cpu_ranges() {
        let cpus = |fragment: &str| Resources::from_allocation(fragment).cpus;
        assert_eq!(cpus(" Nodes=n1 CPU_IDs=0-3 Mem=1"), 4.0);
        assert_eq!(cpus(" Nodes=n1 CPU_IDs=4-4 Mem=1"), 1.0);
        assert_eq!(cpus(" Nodes=n1 CPU_IDs=10-17 Mem=1"), 8.0);
    }

    #[test]
    fn Resources__from_allocation__only_the_first_cpu_range_counts() {
        let res = Resources::from_allocation(" Nodes=n1 CPU_IDs=0-3,8-11 Mem=8000 GRES= ");
        assert_eq!(res, Resources { cpus: 4.0, gpus: 0.0, mem: 8000.0 });
    }

    #[test]
    fn Resources__from_allocation__single_cpu_id_is_not_a_range() {
        assert_eq!(Resources::from_allocation(" Nodes=n1 CPU_IDs=5 Mem=8000 GRES= ").cpus, 0.0);
        assert_eq!(Resources::from_allocation(" Nodes=n1 CPU_IDs=5,7-8 Mem=8000").cpus, 0.0);
    }

    #[test]
    fn Resources__from_allocation__reversed_cpu_range_is_zero() {
        assert_eq!(Resources::from_allocation(" Nodes=n1 CPU_IDs=7-3 Mem=1").cpus, 0.0);
    }
}
