mod config;
mod display;
mod watch;

use anyhow::{anyhow, Result};
use anyping_model::{ProbeConfig, ProbeSpec, StatusSnapshot, CONFIG_VERSION};
use anyping_probe::{
    run_checks_with_runner, PingRunner, ProbeRegistry, StatusAggregator, SystemPingRunner,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use config::{
    add_probe, default_config_path, load_config, move_probe, persist_config, remove_probe,
    set_threshold,
};
use display::{
    render_check_results, render_check_results_json, render_probe_list, render_summary,
    render_summary_json, UiOpts,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use watch::watch_config;

#[derive(Parser)]
#[command(name = "anyping", version, about = "Periodic ping monitor")]
struct Cli {
    /// Config file, defaults to ~/.anyping.json
    #[arg(long, global = true, env = "ANYPING_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter such as `info` or `anyping_probe=debug`; overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run(RunArgs),
    Check(CheckArgs),
    Init(InitArgs),
    #[command(about = "Print configured probes with their positions")]
    List,
    Add(AddArgs),
    Remove(RemoveArgs),
    Move(MoveArgs),
    Threshold(ThresholdArgs),
}

#[derive(Args)]
#[command(about = "Monitor every configured probe until interrupted")]
struct RunArgs {
    #[arg(long)]
    plain: bool,

    #[arg(long, conflicts_with = "plain")]
    json: bool,

    #[arg(long)]
    no_watch: bool,
}

#[derive(Args)]
#[command(about = "Probe targets once and print the results")]
struct CheckArgs {
    #[arg(long = "target")]
    targets: Vec<String>,

    #[arg(long)]
    count: Option<u32>,

    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    #[arg(long)]
    plain: bool,

    #[arg(long, conflicts_with = "plain")]
    json: bool,
}

#[derive(Args)]
#[command(about = "Write the default config")]
struct InitArgs {
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
#[command(about = "Append a probe to the config")]
struct AddArgs {
    address: String,

    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value_t = 1.0)]
    interval: f64,

    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Leave the probe out of the summary line.
    #[arg(long)]
    hide: bool,

    #[arg(long)]
    show_text: bool,

    #[arg(long)]
    inactive: bool,
}

#[derive(Args)]
#[command(about = "Remove the probe at a position")]
struct RemoveArgs {
    position: usize,
}

#[derive(Args)]
#[command(about = "Move a probe to another position")]
struct MoveArgs {
    from: usize,
    to: usize,
}

#[derive(Args)]
#[command(about = "Set the latency (ms) above which a probe shows as slow")]
struct ThresholdArgs {
    ms: f64,
}

enum MonitorEvent {
    Snapshot(StatusSnapshot),
    Reload(ProbeConfig),
    Shutdown,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;
    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Run(args) => run_monitor(config_path, args),
        Commands::Check(args) => run_check(config_path, args),
        Commands::Init(args) => run_init(config_path, args),
        Commands::List => run_list(config_path),
        Commands::Add(args) => edit_config(config_path, |config| {
            let spec = ProbeSpec {
                name: args.name,
                address: args.address,
                update_interval_secs: args.interval,
                echo_count: args.count,
                show_in_summary: !args.hide,
                show_text: args.show_text,
                activated: !args.inactive,
            };
            let position = add_probe(config, spec)?;
            eprintln!("added probe at position {position}");
            Ok(())
        }),
        Commands::Remove(args) => edit_config(config_path, |config| {
            let spec = remove_probe(config, args.position)?;
            eprintln!("removed {}", spec.label());
            Ok(())
        }),
        Commands::Move(args) => {
            edit_config(config_path, |config| move_probe(config, args.from, args.to))
        }
        Commands::Threshold(args) => {
            edit_config(config_path, |config| set_threshold(config, args.ms))
        }
    }
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|err| anyhow!("invalid log level {:?}: {}", level, err))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_thread_names(true)
        .init();
    Ok(())
}

fn run_monitor(config_path: PathBuf, args: RunArgs) -> Result<()> {
    let config = load_config(&config_path)?;
    let opts = UiOpts { plain: args.plain };
    let (tx, rx) = mpsc::channel();

    let aggregator = Arc::new(StatusAggregator::new());
    {
        let tx = tx.clone();
        aggregator.subscribe(move |snapshot| {
            let _ = tx.send(MonitorEvent::Snapshot(snapshot));
        });
    }

    let runner: Arc<dyn PingRunner> = Arc::new(SystemPingRunner::new());
    let registry = ProbeRegistry::with_config(&config, runner, aggregator.clone())?;

    {
        let tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = tx.send(MonitorEvent::Shutdown);
        })
        .map_err(|err| anyhow!("failed to install Ctrl-C handler: {err}"))?;
    }

    let _watcher = if args.no_watch {
        None
    } else {
        let tx = tx.clone();
        Some(watch_config(&config_path, move |config| {
            let _ = tx.send(MonitorEvent::Reload(config));
        })?)
    };
    drop(tx);

    registry.start_all()?;
    info!(
        probes = registry.len(),
        config = %config_path.display(),
        "monitor started"
    );

    let mut stdout = io::stdout();
    while let Ok(event) = rx.recv() {
        match event {
            MonitorEvent::Snapshot(snapshot) => {
                let line = if args.json {
                    render_summary_json(&snapshot, Utc::now())?
                } else {
                    render_summary(&snapshot, &opts, Utc::now())
                };
                writeln!(stdout, "{line}")?;
                stdout.flush()?;
            }
            MonitorEvent::Reload(config) => {
                registry.set_warning_threshold(config.warning_threshold_ms);
                match registry.replace_all(config.probes) {
                    Ok(ids) => {
                        info!(probes = ids.len(), "config reloaded");
                        if let Err(err) = registry.start_all() {
                            warn!(error = %err, "some probes failed to start after reload");
                        }
                    }
                    Err(err) => warn!(error = %err, "config reload rejected"),
                }
            }
            MonitorEvent::Shutdown => break,
        }
    }

    let probes = registry.shutdown();
    aggregator.unsubscribe();
    let final_config = ProbeConfig {
        version: CONFIG_VERSION,
        warning_threshold_ms: registry.warning_threshold(),
        probes,
    };
    persist_config(&config_path, &final_config)?;
    info!(config = %config_path.display(), "config saved");
    Ok(())
}

fn run_check(config_path: PathBuf, args: CheckArgs) -> Result<()> {
    let config = load_config(&config_path)?;
    let (targets, echo_count) = if args.targets.is_empty() {
        let targets: Vec<String> = config
            .probes
            .iter()
            .filter(|spec| spec.activated)
            .map(|spec| spec.address.clone())
            .collect();
        let count = config
            .probes
            .iter()
            .map(|spec| spec.echo_count)
            .max()
            .unwrap_or(1);
        (targets, args.count.unwrap_or(count))
    } else {
        (args.targets, args.count.unwrap_or(1))
    };

    if targets.is_empty() {
        return Err(anyhow!("no targets provided (use --target or add probes)"));
    }
    if echo_count == 0 {
        return Err(anyhow!("--count must be at least 1"));
    }
    if let Some(bad) = targets.iter().find(|target| target.starts_with('-')) {
        return Err(anyhow!("invalid target {bad:?}"));
    }

    let runner = SystemPingRunner::new();
    let results = run_checks_with_runner(&targets, echo_count, args.concurrency, &runner);
    let output = if args.json {
        render_check_results_json(&results, config.warning_threshold_ms, Utc::now())?
    } else {
        render_check_results(
            &results,
            config.warning_threshold_ms,
            &UiOpts { plain: args.plain },
        )
    };
    println!("{output}");
    Ok(())
}

fn run_init(config_path: PathBuf, args: InitArgs) -> Result<()> {
    if config_path.exists() && !args.force {
        return Err(anyhow!(
            "config {:?} already exists (use --force to overwrite)",
            config_path
        ));
    }
    persist_config(&config_path, &ProbeConfig::default())?;
    eprintln!("wrote {}", config_path.display());
    Ok(())
}

fn run_list(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    println!(
        "{}",
        render_probe_list(&config.probes, config.warning_threshold_ms)
    );
    Ok(())
}

fn edit_config<F>(config_path: PathBuf, edit: F) -> Result<()>
where
    F: FnOnce(&mut ProbeConfig) -> Result<()>,
{
    let mut config = load_config(&config_path)?;
    edit(&mut config)?;
    persist_config(&config_path, &config)
}
