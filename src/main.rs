//! AWS Backend Scaffold server
//!
//! Loads configuration, builds the shared AWS client registry and the
//! optional storage wrapper, then serves the HTTP API.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

use aws_backend_scaffold::api;
use aws_backend_scaffold::aws::{ClientRegistry, DefaultConfigLoader};
use aws_backend_scaffold::config::Settings;
use aws_backend_scaffold::storage::S3Service;
use aws_backend_scaffold::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aws_backend_scaffold=info,actix_web=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting AWS Backend Scaffold v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    let loader = match settings.aws.endpoint_url {
        Some(ref endpoint) => DefaultConfigLoader::with_endpoint(endpoint),
        None => DefaultConfigLoader::new(),
    };
    let clients = Arc::new(ClientRegistry::with_loader(loader));

    let region = settings.aws.region.as_deref();
    let storage = match settings.storage.bucket.clone() {
        Some(bucket) => {
            let service = match settings.storage.credentials() {
                Some(credentials) => {
                    S3Service::connect(
                        bucket,
                        region,
                        Some(credentials),
                        settings.aws.endpoint_url.as_deref(),
                    )
                    .await
                }
                None => S3Service::from_registry(&clients, bucket, region)
                    .await
                    .context("Failed to create S3 client")?,
            };
            info!(bucket = %service.bucket(), "Object storage configured");
            Some(service)
        }
        None => {
            info!("No storage bucket configured, running without object storage");
            None
        }
    };

    let workers = settings.server.workers.unwrap_or_else(|| num_cpus::get() * 2);

    let app_state = web::Data::new(AppState {
        settings,
        clients,
        storage,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "aws-backend-scaffold"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION")))
            )
            .configure(api::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
