use portal_platform_access::{CertVerifier, RoleAuthorizer};
use portal_server::{
    auth::{self, AppState, LoginGovProvider, SessionCodec, db::PgStore},
    config::ServerConfig,
    mtls,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let store = Arc::new(PgStore::new(db_pool));

    tracing::info!("Discovering Login.gov provider...");
    let provider = LoginGovProvider::discover(&config.login_gov, &config.hosts)
        .await
        .expect("failed to discover Login.gov provider");

    let app_state = Arc::new(AppState::new(
        Arc::new(provider),
        RoleAuthorizer::new(store.clone()),
        SessionCodec::new(&config.session),
        config.hosts,
        config.login_gov,
    ));

    if let Some(mutual_tls) = &config.listen.mutual_tls {
        let tls = mtls::server_config(mutual_tls).expect("failed to configure mutual TLS");
        let addr = SocketAddr::new(config.listen.interface, mutual_tls.port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("failed to bind mutual-TLS address");
        tracing::info!("mutual-TLS listening on https://{}", addr);

        tokio::spawn(mtls::serve(
            listener,
            tls,
            CertVerifier::new(store),
            mtls::router(),
        ));
    }

    let addr = config.listen.web_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, auth::router(app_state).into_make_service())
        .await
        .expect("server error");
}
