use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use openthread_dl::{
    Backend, Error, EventLoop, OpenThreadLibrary, StackConfig, ThreadStackHost, create_stack, get_backend_info,
};

#[derive(Parser, Debug)]
#[command(about = "Probe an OpenThread shared library")]
struct Cli {
    #[clap(long)]
    #[arg(default_value_t = false)]
    verbose: bool,

    /// JSON host configuration
    #[clap(long)]
    config: Option<PathBuf>,

    /// Library to open instead of the configured one
    #[clap(long)]
    library: Option<PathBuf>,

    /// Only list entry points the library is missing
    #[clap(long)]
    #[arg(default_value_t = false)]
    missing: bool,

    /// Bring the stack up and log topology and counters
    #[clap(long)]
    #[arg(default_value_t = false)]
    init: bool,

    /// Bring up the in-memory simulated stack instead of the library
    #[clap(long)]
    #[arg(default_value_t = false)]
    simulate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .parse_default_env()
        .filter_level(log_level)
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .init();

    let config = match &cli.config {
        Some(path) => StackConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => StackConfig::default(),
    };
    let path = cli.library.clone().unwrap_or_else(|| config.library_path());

    let library = OpenThreadLibrary::shared();
    library
        .open(&path, config.open_flags())
        .with_context(|| format!("opening {}", path.display()))?;

    let symbols = library.symbols();
    for name in library.catalog() {
        let resolved = symbols.is_resolved(name);
        if !cli.missing || !resolved {
            println!("{} {}", if resolved { "+" } else { "-" }, name);
        }
    }
    println!(
        "{}/{} entry points resolved, backend {}",
        library.resolved_count(),
        library.catalog().len(),
        get_backend_info(&library)
    );

    if cli.init {
        let backend = if cli.simulate {
            Backend::Simulated
        } else {
            Backend::Native
        };
        probe_stack(config, library, backend)?;
    } else {
        library.close();
    }
    Ok(())
}

fn probe_stack(config: StackConfig, library: std::sync::Arc<OpenThreadLibrary>, backend: Backend) -> Result<()> {
    let ftd = config.ftd;
    let event_loop = EventLoop::new();
    let stack = create_stack(library.clone(), backend);
    let mut host = ThreadStackHost::new(config, library, event_loop.clone());

    let manager = host.init_with_stack(stack).context("initializing thread stack")?;
    event_loop.run_until_idle();

    println!(
        "settings file {}, provisioned {}, attached {}",
        host.settings_file().unwrap_or("-"),
        manager.is_thread_provisioned(),
        manager.is_thread_attached()
    );
    manager
        .get_and_log_thread_stats_counters()
        .context("reading counters")?;
    manager
        .get_and_log_thread_topology_minimal()
        .context("reading topology")?;
    if ftd {
        match manager.get_and_log_thread_topology_full() {
            Ok(()) | Err(Error::UnsupportedFeature) => {}
            Err(e) => return Err(e).context("reading full topology"),
        }
    }

    host.deinit_thread_stack().context("tearing down thread stack")?;
    Ok(())
}
