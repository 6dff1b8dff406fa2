use service_core::observability::init_tracing;
use storefront_service::{config::StorefrontConfig, Application};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = StorefrontConfig::load()?;

    init_tracing(
        "storefront-service",
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )?;

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
