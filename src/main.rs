use signal_relay::api;
use signal_relay::config::{Config, LogFormat};
use signal_relay::error::Result;
use signal_relay::relay::RoomRegistry;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.logging.format);

    let registry = RoomRegistry::new();
    let routes = api::routes(registry, config.server.static_dir.clone());

    let (ip, port) = config.bind_address();
    tracing::info!(
        host = %std::net::Ipv4Addr::from(ip),
        port,
        static_dir = %config.server.static_dir.display(),
        "Signaling relay listening"
    );

    warp::serve(routes)
        .run(config.bind_address())
        .await;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
