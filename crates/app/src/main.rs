mod backend;
mod catalog_file;
mod events;
mod feed;
mod generation;
mod problem;
mod router;
mod session;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use fonthost_graphql::{GeneratorClient, GraphqlClient, UploadClient};
use fonthost_util::{load_env_file, AppConfig, Environment};
use tokio::sync::RwLock;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let catalog = catalog_file::load_catalog(
        &config.catalog_path,
        !matches!(config.environment, Environment::Production),
    )?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("fonthost/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let backend = backend::RemoteBackend::new(
        GraphqlClient::new(
            config.endpoints.graphql.clone(),
            config.graphql_token.clone(),
            http.clone(),
        ),
        UploadClient::new(config.endpoints.upload.clone(), http.clone()),
        GeneratorClient::new(config.endpoints.generator.clone(), http),
    );

    let deps = session::SessionDeps {
        catalog: Arc::new(RwLock::new(catalog)),
        backend: Arc::new(backend),
        feed: feed::BufferFeed::new(),
        hosting_timeout: config.hosting_timeout,
    };
    let state = router::AppState::new(metrics, deps, Arc::from(config.callback_secret.clone()));
    state.sessions().spawn_reaper(config.session_idle_timeout);

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        graphql = %config.endpoints.graphql,
        hosting_timeout_secs = config.hosting_timeout.as_secs(),
        session_idle_secs = config.session_idle_timeout.as_secs(),
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
