use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidhub_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| {
                    std::env::var("LOG_LEVEL")
                        .map(|level| tracing_subscriber::EnvFilter::new(format!("vidhub={level}")))
                })
                .unwrap_or_else(|_| "vidhub=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (state, router) = vidhub_api::setup::initialize_app(config).await?;

    vidhub_api::setup::server::start_server(&state, router).await?;

    Ok(())
}
