use crate::scan::DEFAULT_CLUSTER_DOMAIN;
use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const DEFAULT_FREQUENCY: &str = "2h";
pub const DEFAULT_TIMEOUT: &str = "400ms";

/// Pure clap command definitions with zero business logic
#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("frequency")
                .default_value(DEFAULT_FREQUENCY)
                .env("TLS_VERIFIER_FREQUENCY")
                .help("time to sleep between scans, e.g. 30m, 2h, 1h30m")
                .long("frequency")
                .short('f')
                .value_name("DURATION"),
        )
        .arg(
            Arg::new("timeout")
                .default_value(DEFAULT_TIMEOUT)
                .env("TLS_VERIFIER_TIMEOUT")
                .help("TLS connection timeout per service port, e.g. 400ms, 2s")
                .long("timeout")
                .short('t')
                .value_name("DURATION"),
        )
        .arg(
            Arg::new("skip-namespace-regex")
                .default_value("")
                .env("TLS_VERIFIER_SKIP_NAMESPACE_REGEX")
                .help("skip services whose namespace matches this regular expression")
                .long("skip-namespace-regex")
                .long_help(
                    "Regular expression matched anywhere in the namespace name.\n\
                    Services in matching namespaces are not probed.\n\
                    An empty value disables the filter.\n\n\
                    Examples:\n\
                    - `^kube-` skips kube-system, kube-public, ...\n\
                    - `^(monitoring|logging)$` skips exactly those two"
                )
                .short('s')
                .value_name("REGEX"),
        )
        .arg(
            Arg::new("listen")
                .env("TLS_VERIFIER_LISTEN")
                .help("IP address to bind to (default: [::]:port, accepts both IPv6 and IPv4)")
                .long("listen")
                .long_help(
                    "IP address to bind to:\n\
                    Not specified (default) binds to [::]:port which accepts both IPv6 and IPv4 connections.\n\
                    Falls back to 0.0.0.0:port if IPv6 is unavailable.\n\n\
                    Specific IPv4 examples: '0.0.0.0', '127.0.0.1'\n\
                    Specific IPv6: '::', '::1'"
                )
                .short('l')
                .value_name("IP"),
        )
        .arg(
            Arg::new("port")
                .default_value("9999")
                .env("TLS_VERIFIER_PORT")
                .help("listening port for /metrics, /livez and /healthz")
                .long("port")
                .short('p')
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("concurrency")
                .default_value("10")
                .env("TLS_VERIFIER_CONCURRENCY")
                .help("number of service ports probed at the same time")
                .long("concurrency")
                .short('c')
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
        .arg(
            Arg::new("cluster-domain")
                .default_value(DEFAULT_CLUSTER_DOMAIN)
                .env("TLS_VERIFIER_CLUSTER_DOMAIN")
                .help("DNS suffix of in-cluster service names")
                .long("cluster-domain")
                .value_name("DOMAIN"),
        )
        .arg(
            Arg::new("verbose")
                .action(ArgAction::Count)
                .help("increase log verbosity (-v debug, -vv trace), RUST_LOG wins when set")
                .long("verbose")
                .short('v'),
        )
}
