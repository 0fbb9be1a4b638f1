use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `log_format` is either "json" or anything
/// else for the human readable format.
pub fn setup_tracing(log_format: &str, node_name: String) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dice_party=info,dice_game=info,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    match log_format {
        "json" => registry.with(fmt::layer().json()).try_init()?,
        _ => registry.with(fmt::layer()).try_init()?,
    }

    tracing::info!(node = %node_name, "Tracing initialized with {} format", log_format);
    Ok(())
}
