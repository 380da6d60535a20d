use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use share_images::{
    api::{self, pages::Pages},
    config::{Config, Credential, StorageBackend, SHUTDOWN_GRACE},
    image_store::{EmbeddedStore, ImageStore, MongoStore},
    server,
    storage::Database,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "share-images starting");

    let config = Config::load()?;
    let pages = Pages::load(&config.pages)?;

    let store: Arc<dyn ImageStore> = match config.storage.backend {
        StorageBackend::Embedded => {
            let db = Database::open(&config.storage.data_dir)?;
            info!("Using embedded storage at: {}", config.storage.data_dir);
            Arc::new(EmbeddedStore::new(db))
        }
        StorageBackend::Mongo => {
            let mongo = &config.storage.mongo;
            let credential = mongo
                .auth_file
                .as_deref()
                .map(Credential::load)
                .transpose()?;
            let store = MongoStore::connect(
                &mongo.uri,
                &mongo.database,
                &mongo.collection,
                credential.as_ref(),
            )
            .await?;
            info!(
                database = %mongo.database,
                collection = %mongo.collection,
                "Using MongoDB storage"
            );
            Arc::new(store)
        }
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        pages,
        store,
    });

    let app = api::create_router(state);
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);

    server::serve(listener, app, server::shutdown_signal(), SHUTDOWN_GRACE).await?;

    info!("Shutdown complete");
    Ok(())
}
