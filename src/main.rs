mod config;
mod db;
mod error;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::AppConfig::from_env().expect("invalid configuration");

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");

    let last_update = services::changes::global_last_update(&pool)
        .await
        .expect("change log unreadable");
    tracing::info!(database_url = %config.database_url, last_update, "database ready");

    let state = state::AppState::new(pool);
    let app = routes::app(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    tracing::info!(%addr, "cep server listening");
    axum::serve(listener, app).await.expect("server failed");
}
