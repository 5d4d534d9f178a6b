//! Basic example showing how to use sea-orm-query-telemetry.
//!
//! Run with: cargo run --example basic

use sea_orm::{Database, DbBackend, Statement, Value};
use sea_orm_query_telemetry::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sea_orm_query_telemetry=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/test".into());

    tracing::info!("Connecting to database...");

    let db = Database::connect(&database_url).await?;

    // Development config: statements, parameters and row iteration are traced
    let traced_db = db.with_tracing_config(TracingConfig::development());

    // Labels attached to the context end up on the metrics and the span
    let ctx = with_custom_attributes(&CallContext::new(), [KeyValue::new("tenant", "demo")]);
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT $1::int AS answer",
        [Value::from(42i32)],
    );

    let rows = traced_db.query_all_with_context(ctx, stmt).await?;
    tracing::info!(rows = rows.len(), "Query finished");

    Ok(())
}
