use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use image_gallery::{
    api::{self, AppState},
    config::Config,
    media::Cloudinary,
    store::MongoStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let store = MongoStore::connect(&config.database_url)
        .await
        .context("failed to connect to the metadata store")?;
    let media = Cloudinary::new(config.media.clone(), config.upload_folder.clone());

    let state = AppState {
        store: Arc::new(store),
        media: Arc::new(media),
    };
    let app = api::router(state);

    let bind_address = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!("image gallery listening at http://{bind_address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
