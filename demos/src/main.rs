use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use stampede::prelude::*;
use stampede::Method;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Run an HTTP load test and print a graded report.
#[derive(Parser, Debug)]
#[command(version = "0.1")]
struct Cli {
    /// Base URL of the service under test.
    base_url: String,

    #[arg(short, long, value_enum, default_value_t = ProfileArg::Smoke)]
    profile: ProfileArg,

    /// `name=[METHOD ]path[@weight]`, e.g. `items=GET /items@3`. Repeatable.
    #[arg(short, long = "scenario", value_parser = parse_scenario)]
    scenarios: Vec<ScenarioDefinition>,

    #[arg(short, long)]
    concurrency: Option<usize>,

    #[arg(short, long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    #[arg(short('n'), long)]
    max_requests_per_worker: Option<u64>,

    #[arg(long, value_parser = humantime::parse_duration)]
    think_time: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    think_jitter: Duration,

    #[arg(long)]
    max_retries: Option<u32>,

    #[arg(long, value_parser = humantime::parse_duration)]
    request_timeout: Option<Duration>,

    #[arg(long)]
    max_rps: Option<NonZeroU32>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Serve attempt metrics in Prometheus format on this address.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Smoke,
    Stress,
    Endurance,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Smoke => Profile::Smoke,
            ProfileArg::Stress => Profile::Stress,
            ProfileArg::Endurance => Profile::Endurance,
        }
    }
}

fn parse_scenario(s: &str) -> Result<ScenarioDefinition> {
    let (name, rest) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected name=path, got `{s}`"))?;
    let (target, weight) = match rest.rsplit_once('@') {
        Some((target, weight)) => (target, weight.parse().context("invalid weight")?),
        None => (rest, 1.),
    };
    let (method, path) = match target.split_once(' ') {
        Some((method, path)) => (
            Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .context("invalid method")?,
            path,
        ),
        None => (Method::GET, target),
    };
    Ok(ScenarioDefinition::new(name, method, path.trim(), weight))
}

fn config(cli: &Cli) -> Result<RunConfig, ConfigurationError> {
    let mut builder = Profile::from(cli.profile).builder(&cli.base_url);

    if cli.scenarios.is_empty() {
        builder = builder.scenario(ScenarioDefinition::get("root", "/", 1.));
    } else {
        builder = builder.scenarios(cli.scenarios.clone());
    }
    if let Some(concurrency) = cli.concurrency {
        builder = builder.concurrency(concurrency);
    }
    if let Some(duration) = cli.duration {
        builder = builder.duration(duration);
    }
    if let Some(max) = cli.max_requests_per_worker {
        builder = builder.max_requests_per_worker(max);
    }
    if let Some(think_time) = cli.think_time {
        builder = builder.think_time(ThinkTime::new(think_time, cli.think_jitter));
    }
    if let Some(max_retries) = cli.max_retries {
        builder = builder.retry_policy(RetryPolicy {
            max_retries,
            ..Default::default()
        });
    }
    if let Some(timeout) = cli.request_timeout {
        builder = builder.request_timeout(timeout);
    }
    if let Some(max_rps) = cli.max_rps {
        builder = builder.max_rps(max_rps);
    }

    builder.build()
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stampede=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install prometheus exporter")?;
    }

    let config = config(&cli)?;
    let harness = Harness::new(config)?;

    let cancel = harness.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping workers");
            cancel.cancel();
        }
    });

    let report = harness.run().await?;
    info!("Run finished");

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{report}");
    }

    Ok(())
}
