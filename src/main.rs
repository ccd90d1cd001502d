use feedback360::config::{AppConfig, StorageBackend};
use feedback360::db::{seed, MemoryStore, PgStore};
use feedback360::services::LifecycleService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let lifecycle = match config.storage {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL missing"))?;
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(database_url)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to database: {}", e);
                    e
                })?;
            tracing::info!("Database connection established");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to run database migrations: {}", e);
                    e
                })?;
            tracing::info!("Database migrations completed");

            if config.seed_demo_data {
                seed::seed_employees(&pool).await?;
            }
            LifecycleService::from_store(Arc::new(PgStore::new(pool)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let store = MemoryStore::new();
            if config.seed_demo_data {
                for employee in seed::demo_employees()? {
                    tracing::info!(
                        "Demo employee {} {} ({:?}): {}",
                        employee.first_name,
                        employee.last_name,
                        employee.role,
                        employee.id
                    );
                    store.insert_employee(employee);
                }
            }
            LifecycleService::from_store(Arc::new(store))
        }
    };

    let app = feedback360::app(feedback360::shared_state(lifecycle));

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
