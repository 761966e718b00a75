#[tokio::main]
async fn main() -> anyhow::Result<()> {
    grantlink_observability::init();

    let addr = std::env::var("GRANTLINK_ADDR").unwrap_or_else(|_| {
        tracing::warn!("GRANTLINK_ADDR not set; using 0.0.0.0:8080");
        "0.0.0.0:8080".to_string()
    });

    let app = grantlink_api::app::build_app().await?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
