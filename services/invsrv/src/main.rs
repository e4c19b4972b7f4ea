use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use invsrv::app::App;
use invsrv::config::Config;

#[derive(Parser)]
#[command(name = "invsrv", version, about = "Modbus field-device polling service")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "INVSRV_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Log filter override, e.g. "debug" or "invsrv=trace"
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if args.check {
        println!(
            "configuration OK: {} device(s) on {} bus(es)",
            config.devices.len(),
            config.buses.len()
        );
        return Ok(());
    }

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.service.log_level);
    let _log_guard = common::logging::init("invsrv", Some(level), config.service.log_dir.as_deref());

    info!(
        devices = config.devices.len(),
        buses = config.buses.len(),
        broker = %config.mqtt.host,
        "starting invsrv"
    );

    let mut app = App::build(config)?;
    app.run().await?;
    Ok(())
}
