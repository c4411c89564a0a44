use anyhow::Context as _;
use mri_report_service::{ServiceConfig, create_app};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `LOG_FORMAT=pretty` for development, structured JSON otherwise.
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "mri_report_service=debug,graph_flow=debug,tower_http=debug".into()
    });

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    if config.default_api_key.is_none() {
        info!("MRI_API_KEY not set, sessions must provide their own key");
    }

    let app = create_app(&config);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("cannot bind port {}", config.port))?;
    let addr = listener.local_addr()?;

    info!("MRI Report Assistant starting on {}", addr);
    info!("API description at http://{}/", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!(
        "Provider {:?}, model {}, export {}",
        config.provider,
        config.model,
        if config.export_enabled {
            config.export_path.display().to_string()
        } else {
            "disabled".to_string()
        }
    );

    axum::serve(listener, app).await?;

    Ok(())
}
