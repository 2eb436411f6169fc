use color_eyre::{eyre::Context as _, Result};
use itertools::Itertools as _;

/// Something that can turn a compressed Slurm nodelist (`node[01-03,07]`) into the hostnames it
/// denotes.
///
/// The real implementation shells out to `scontrol show hostnames`, see
/// [`SlurmCli`](crate::slurm::SlurmCli).
pub trait HostnameExpander {
    /// Raw expansion output, one hostname per line.
    fn hostnames(&self, nodelist: &str) -> Result<String>;
}

impl<T: HostnameExpander + ?Sized> HostnameExpander for &T {
    fn hostnames(&self, nodelist: &str) -> Result<String> {
        (**self).hostnames(nodelist)
    }
}

/// Expand a nodelist expression into individual hostnames.
///
/// Without a `[` the expression is a single hostname and the expander is not called.
#[tracing::instrument(level = "trace", skip(expander))]
pub fn expand_nodelist<E>(nodelist: &str, expander: &E) -> Result<Vec<String>>
where
    E: HostnameExpander + ?Sized,
{
    if !nodelist.contains('[') {
        return Ok(vec![nodelist.to_owned()]);
    }

    let output = expander
        .hostnames(nodelist)
        .wrap_err_with(|| format!("expanding nodelist `{nodelist}`"))?;
    Ok(parse_hostnames(&output))
}

/// One hostname per non-empty line.
pub fn parse_hostnames(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect_vec()
}
