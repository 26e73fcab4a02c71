use backbone_core::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backbone_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("BACKBONE_CONFIG").ok();
    let config = Config::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        Config::default()
    });

    backbone_gateway::serve(config).await
}
