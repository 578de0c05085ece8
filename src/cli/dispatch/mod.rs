use crate::{cli::actions::Action, cli::duration, filter::NamespaceFilter, scan::ScanConfig};
use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use std::{net::IpAddr, time::Duration};

fn positive_duration(matches: &ArgMatches, id: &str, what: &str) -> Result<Duration> {
    let raw = matches
        .get_one::<String>(id)
        .with_context(|| format!("{what} is required"))?;
    let value = duration::parse(raw).with_context(|| format!("Invalid {what}: {raw}"))?;
    if value.is_zero() {
        bail!("Invalid {what}: {raw} must be greater than zero");
    }
    Ok(value)
}

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if a duration, the namespace pattern or the listen
/// address is invalid
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    let interval = positive_duration(matches, "frequency", "frequency")?;
    let timeout = positive_duration(matches, "timeout", "TLS timeout")?;

    let pattern = matches
        .get_one::<String>("skip-namespace-regex")
        .map_or("", String::as_str);
    let filter = NamespaceFilter::new(pattern)
        .with_context(|| format!("Invalid skip namespace regex: {pattern}"))?;

    // Extract and validate listen address
    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    let port = matches.get_one::<u16>("port").copied().unwrap_or(9999);

    let defaults = ScanConfig::default();
    let concurrency = matches
        .get_one::<u16>("concurrency")
        .map_or(defaults.concurrency, |c| usize::from(*c));
    let cluster_domain = matches
        .get_one::<String>("cluster-domain")
        .cloned()
        .unwrap_or(defaults.cluster_domain);

    Ok(Action::Scan {
        config: ScanConfig {
            interval,
            concurrency,
            cluster_domain,
        },
        timeout,
        filter,
        listen,
        port,
    })
}
