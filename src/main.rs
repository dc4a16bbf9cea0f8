//! `resource-server`: serves the bundled `widgets` and `products` modules from layered,
//! hot-reloaded configuration (`<conf-dir>/<name>.toml`, secrets file, `APP_*` env, `-D`).

use clap::Parser;
use resource_server::{default_sources, Catalog, ConfigMerger, Configuration, PropertiesSource, ServerController};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

const DEFAULT_FILTER: &str = "resource_server=info,tower_http=info";
const DEBUG_FILTER: &str = "resource_server=debug,tower_http=debug";

#[derive(Parser, Debug)]
#[command(name = "resource-server", version, about)]
struct Cli {
    /// Directory holding `<name>.toml` (or `.json`) and `<name>-secrets.toml`.
    #[arg(long, default_value = "conf")]
    conf_dir: PathBuf,

    /// Base name of the configuration files.
    #[arg(long, default_value = "server")]
    name: String,

    /// Property override, highest precedence. Repeatable: `-D port=9000 -D prod.debug=true`.
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    properties: Vec<String>,
}

fn filter_for(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { DEBUG_FILTER } else { DEFAULT_FILTER })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let from_env = EnvFilter::try_from_default_env().ok();
    let follow_config = from_env.is_none();
    let (filter, filter_handle) = reload::Layer::new(from_env.unwrap_or_else(|| filter_for(false)));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();

    let properties = PropertiesSource::parse(cli.properties.as_slice())?;
    let merger = Arc::new(ConfigMerger::new(default_sources(&cli.conf_dir, &cli.name, properties)));
    let config = merger.retrieve().await;

    if follow_config {
        let debug = Arc::new(AtomicBool::new(false));
        let apply = move |config: &Arc<Configuration>| {
            if debug.swap(config.debug(), Ordering::SeqCst) != config.debug() {
                if let Err(e) = filter_handle.reload(filter_for(config.debug())) {
                    tracing::warn!(error = %e, "log filter reload failed");
                }
            }
        };
        apply(&config);
        merger.subscribe(Arc::new(apply));
    }
    let _watch = merger.listen()?;

    let handle = ServerController::start(Arc::new(Catalog::new()), merger).await?;
    if let Some(addr) = handle.local_addr() {
        tracing::info!(address = %addr, "listening; Ctrl-C to stop");
    }
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    handle.shutdown().await;
    Ok(())
}
