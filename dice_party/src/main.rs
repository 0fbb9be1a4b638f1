use anyhow::{Context, Result};
use clap::Parser;
use dice_party::{
    logger::setup_tracing, metrics::setup_metrics, round_engine::RoundEngineModule,
    websocket::WebSocketModule, Conf,
};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value = "config.toml")]
    pub config_file: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Conf::new(args.config_file).context("Failed to load config")?;

    setup_tracing(&config.log_format, config.id.clone()).context("setting up tracing")?;

    tracing::info!("Starting app with config: {:?}", &config);
    let config = Arc::new(config);

    let registry = setup_metrics().context("setting up metrics")?;

    tracing::info!("Setting up modules");

    let (engine, handle) = RoundEngineModule::build(&config);
    let ctx = Arc::new(dice_party::Context {
        config: config.clone(),
        engine: handle,
        registry,
    });
    let mut websocket = WebSocketModule::build(ctx.clone());

    tracing::info!("Starting modules");

    let mut engine_task = tokio::spawn(engine.run());

    tokio::select! {
        res = websocket.run() => res.context("websocket module")?,
        res = &mut engine_task => res.context("round engine task")?.context("round engine")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C, shutting down"),
    }

    Ok(())
}
