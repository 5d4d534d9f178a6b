//! Instrumented database connection wrapper.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, ExecResult, QueryResult, Statement,
};

use crate::config::TracingConfig;
use crate::context::CallContext;
use crate::driver::{drain_rows, first_row, named_values, NamedValue, QueryOutcome, VecRows};
use crate::error::QueryError;
use crate::middleware::{chain_query_middlewares, QueryContext, QueryContextFn};
use crate::query::{make_queryer_middlewares, QueryConfig, METRIC_METHOD_QUERY, TRACE_METHOD_QUERY};
use crate::recorder::MetricsRecorder;
use crate::telemetry::{MethodRecorder, MethodTracer};
use crate::tracer::SpanTracer;

/// An instrumented wrapper around SeaORM's `DatabaseConnection`.
///
/// This wrapper implements `ConnectionTrait` only, so it works anywhere SeaORM
/// accepts a generic connection for queries and statements. Streaming and
/// transactions are not available on it; use [`TracedConnection::inner`] for
/// those. Every query runs through the middleware chain: metrics first, then
/// a span, then (optionally) traced result rows.
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use sea_orm_query_telemetry::{CallContext, KeyValue, TracedConnection};
///
/// let db = Database::connect("postgres://localhost/mydb").await?;
/// let traced = TracedConnection::from(db);
///
/// // All queries are now instrumented
/// let users = Users::find().all(&traced).await?;
///
/// // Per-call labels
/// let ctx = CallContext::new().with_attributes([KeyValue::new("tenant", "acme")]);
/// let rows = traced.query_all_with_context(ctx, stmt).await?;
/// ```
#[derive(Clone)]
pub struct TracedConnection {
    inner: Arc<DatabaseConnection>,
    config: Arc<TracingConfig>,
    queryer: QueryContextFn,
    query_oner: QueryContextFn,
}

impl std::fmt::Debug for TracedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedConnection")
            .field("inner", &*self.inner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TracedConnection {
    /// Create a new traced connection with the given configuration.
    pub fn new(connection: DatabaseConnection, config: TracingConfig) -> Self {
        let tracer: Option<Arc<dyn MethodTracer>> = config.span_tracing.then(|| {
            Arc::new(SpanTracer::new(&config, db_system(&connection))) as Arc<dyn MethodTracer>
        });
        Self::with_telemetry(connection, config, Arc::new(MetricsRecorder::new()), tracer)
    }

    /// Create a new traced connection with default configuration.
    pub fn wrap(connection: DatabaseConnection) -> Self {
        Self::new(connection, TracingConfig::default())
    }

    /// Create a traced connection reporting to custom collaborators.
    ///
    /// Passing `None` as tracer disables spans and row tracing; metrics are
    /// always recorded.
    pub fn with_telemetry(
        connection: DatabaseConnection,
        config: TracingConfig,
        recorder: Arc<dyn MethodRecorder>,
        tracer: Option<Arc<dyn MethodTracer>>,
    ) -> Self {
        let conn = Arc::new(connection);
        let all: QueryContextFn = Arc::new(DriverQuery {
            conn: conn.clone(),
            single_row: false,
        });
        let one: QueryContextFn = Arc::new(DriverQuery {
            conn: conn.clone(),
            single_row: true,
        });
        Self::build(conn, config, recorder, tracer, all, one)
    }

    /// Create a traced connection whose chain ends in `base` instead of the
    /// connection itself.
    ///
    /// `base` may return [`QueryError::Skip`] for queries it does not handle;
    /// those are then sent to `connection` without instrumentation.
    pub fn with_base_query(
        connection: DatabaseConnection,
        config: TracingConfig,
        recorder: Arc<dyn MethodRecorder>,
        tracer: Option<Arc<dyn MethodTracer>>,
        base: QueryContextFn,
    ) -> Self {
        Self::build(Arc::new(connection), config, recorder, tracer, base.clone(), base)
    }

    fn build(
        conn: Arc<DatabaseConnection>,
        config: TracingConfig,
        recorder: Arc<dyn MethodRecorder>,
        tracer: Option<Arc<dyn MethodTracer>>,
        all: QueryContextFn,
        one: QueryContextFn,
    ) -> Self {
        let query_config = QueryConfig::new(&config, METRIC_METHOD_QUERY, TRACE_METHOD_QUERY);
        let middlewares = make_queryer_middlewares(recorder, tracer, &query_config);

        Self {
            inner: conn,
            config: Arc::new(config),
            queryer: chain_query_middlewares(&middlewares, all),
            query_oner: chain_query_middlewares(&middlewares, one),
        }
    }

    /// Get a reference to the underlying `DatabaseConnection`.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    /// Get the tracing configuration.
    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    /// Consume the wrapper and return the inner `DatabaseConnection`.
    ///
    /// Clones of the wrapper share the connection; while any of them is alive
    /// the shared handle is returned as the error.
    pub fn into_inner(self) -> Result<DatabaseConnection, Arc<DatabaseConnection>> {
        let Self {
            inner,
            queryer,
            query_oner,
            ..
        } = self;
        drop(queryer);
        drop(query_oner);

        Arc::try_unwrap(inner)
    }

    /// Run a query through the middleware chain with caller-supplied context.
    ///
    /// When the chain reports [`QueryError::Skip`], the query is sent to the
    /// inner connection directly.
    pub async fn query_all_with_context(
        &self,
        ctx: CallContext,
        stmt: Statement,
    ) -> Result<Vec<QueryResult>, DbErr> {
        let args = named_values(&stmt);

        match self.queryer.query(ctx, &stmt.sql, &args).await {
            Ok(Some(mut rows)) => Ok(drain_rows(rows.as_mut())?),
            Ok(None) => Ok(Vec::new()),
            Err(QueryError::Skip) => {
                tracing::debug!("Instrumented query path skipped, falling back to driver");
                self.inner.query_all(stmt).await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Like [`Self::query_all_with_context`], for a single row.
    ///
    /// The driver is asked for one row only, and the result set is closed
    /// after the first read.
    pub async fn query_one_with_context(
        &self,
        ctx: CallContext,
        stmt: Statement,
    ) -> Result<Option<QueryResult>, DbErr> {
        let args = named_values(&stmt);

        match self.query_oner.query(ctx, &stmt.sql, &args).await {
            Ok(Some(mut rows)) => Ok(first_row(rows.as_mut())?),
            Ok(None) => Ok(None),
            Err(QueryError::Skip) => {
                tracing::debug!("Instrumented query path skipped, falling back to driver");
                self.inner.query_one(stmt).await
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Get the database backend name for span attributes.
fn db_system(connection: &DatabaseConnection) -> &'static str {
    match connection.get_database_backend() {
        DbBackend::Postgres => "postgresql",
        DbBackend::MySql => "mysql",
        DbBackend::Sqlite => "sqlite",
    }
}

/// Base of the chain: runs the query on the wrapped connection.
struct DriverQuery {
    conn: Arc<DatabaseConnection>,
    single_row: bool,
}

#[async_trait]
impl QueryContext for DriverQuery {
    async fn query(&self, _ctx: CallContext, query: &str, args: &[NamedValue]) -> QueryOutcome {
        let stmt = Statement::from_sql_and_values(
            self.conn.get_database_backend(),
            query,
            args.iter().map(|arg| arg.value.clone()),
        );
        let rows = if self.single_row {
            self.conn.query_one(stmt).await?.into_iter().collect()
        } else {
            self.conn.query_all(stmt).await?
        };

        Ok(Some(Box::new(VecRows::new(rows))))
    }
}

impl From<DatabaseConnection> for TracedConnection {
    fn from(connection: DatabaseConnection) -> Self {
        Self::wrap(connection)
    }
}

impl AsRef<DatabaseConnection> for TracedConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

#[async_trait]
impl ConnectionTrait for TracedConnection {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        self.inner.execute(stmt).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        self.inner.execute_unprepared(sql).await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        self.query_one_with_context(CallContext::new(), stmt).await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        self.query_all_with_context(CallContext::new(), stmt).await
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner.is_mock_connection()
    }
}

/// Extension trait for easy wrapping of database connections.
pub trait TracingExt {
    /// Wrap this connection with query instrumentation.
    fn with_tracing(self) -> TracedConnection;

    /// Wrap this connection with custom configuration.
    fn with_tracing_config(self, config: TracingConfig) -> TracedConnection;
}

impl TracingExt for DatabaseConnection {
    fn with_tracing(self) -> TracedConnection {
        TracedConnection::wrap(self)
    }

    fn with_tracing_config(self, config: TracingConfig) -> TracedConnection {
        TracedConnection::new(self, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Capture;
    use sea_orm::{MockDatabase, Value};
    use std::collections::BTreeMap;

    fn mock() -> DatabaseConnection {
        MockDatabase::new(DbBackend::Postgres)
            .append_query_errors([DbErr::Custom("relation does not exist".to_string())])
            .into_connection()
    }

    fn mock_rows(count: i32) -> DatabaseConnection {
        let rows: Vec<_> = (1..=count)
            .map(|id| BTreeMap::from([("id", Value::from(id))]))
            .collect();
        MockDatabase::new(DbBackend::Postgres)
            .append_query_results([rows])
            .into_connection()
    }

    fn select() -> Statement {
        Statement::from_string(DbBackend::Postgres, r#"SELECT "id" FROM "users""#)
    }

    #[test]
    fn test_extension_trait_wraps_with_defaults() {
        let traced = mock().with_tracing();
        assert!(traced.config().span_tracing);
        assert!(traced.is_mock_connection());
        assert_eq!(traced.get_database_backend(), DbBackend::Postgres);
    }

    #[test]
    fn test_db_system_names() {
        assert_eq!(db_system(&mock()), "postgresql");
    }

    #[tokio::test]
    async fn test_driver_error_passes_through() {
        let traced = TracedConnection::new(mock(), TracingConfig::production());
        let stmt = Statement::from_string(DbBackend::Postgres, "SELECT * FROM missing");

        match traced.query_all(stmt).await {
            Err(DbErr::Custom(msg)) => assert_eq!(msg, "relation does not exist"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(rows) => panic!("expected an error, got {} rows", rows.len()),
        }
    }

    #[tokio::test]
    async fn test_new_creates_query_span() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let traced = TracedConnection::new(mock_rows(2), TracingConfig::default());
        let rows = traced.query_all(select()).await.unwrap();
        assert_eq!(rows.len(), 2);

        let spans = capture.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "db.query");
        assert_eq!(spans[0].field("db.system"), Some("postgresql"));
        assert_eq!(spans[0].field("otel.status_code"), Some("OK"));
    }

    #[tokio::test]
    async fn test_disabled_span_tracing_records_no_spans() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let traced = TracedConnection::new(
            mock_rows(2),
            TracingConfig::development().with_span_tracing(false),
        );
        let rows = traced.query_all(select()).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert!(capture.spans().is_empty());
    }

    #[tokio::test]
    async fn test_into_inner_while_cloned() {
        let traced = mock_rows(1).with_tracing();
        let clone = traced.clone();

        let shared = traced.into_inner().unwrap_err();
        assert!(shared.is_mock_connection());

        drop(shared);
        assert!(clone.into_inner().is_ok());
    }
}
