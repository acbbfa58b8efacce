use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::StartupHandler;
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo,
    QueryResponse, Response,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::service::{OccupancyService, ServiceError, now_ms};
use crate::sql::{self, Command, SqlError};
use crate::tracker::CategoryOccupancy;

pub struct DevpoolHandler {
    service: Arc<OccupancyService>,
    query_parser: Arc<DevpoolQueryParser>,
}

impl DevpoolHandler {
    pub fn new(service: Arc<OccupancyService>) -> Self {
        Self {
            service,
            query_parser: Arc::new(DevpoolQueryParser),
        }
    }

    async fn execute_command(&self, cmd: Command, format: &Format) -> PgWireResult<Vec<Response>> {
        let label = cmd.label();
        let started = Instant::now();
        let result = self.run(cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(crate::observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(crate::observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn run(&self, cmd: Command, format: &Format) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::SelectOccupancy { category, now } => {
                let now = now.unwrap_or_else(now_ms);
                let occupancy = match category {
                    Some(name) => vec![
                        self.service
                            .category_occupancy(&name, now)
                            .await
                            .map_err(service_err)?,
                    ],
                    None => self.service.occupancy(now).await.map_err(service_err)?,
                };
                Ok(vec![self.occupancy_response(&occupancy, format)])
            }
            Command::SelectTracker { now } => {
                let rows = self
                    .service
                    .tracker_rows(now.unwrap_or_else(now_ms))
                    .await
                    .map_err(service_err)?;

                let schema = Arc::new(fields(TRACKER_COLUMNS, format));
                let rows: Vec<PgWireResult<_>> = rows
                    .into_iter()
                    .map(|row| {
                        let key = row.key.as_str().to_string();
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&key)?;
                        encoder.encode_field(&row.category)?;
                        encoder.encode_field(&row.value)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectCategories => {
                let schema = Arc::new(fields(CATEGORIES_COLUMNS, format));
                let rows: Vec<PgWireResult<_>> = self
                    .service
                    .tracker()
                    .categories()
                    .iter()
                    .map(|category| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&category.name)?;
                        encoder.encode_field(&(category.capacity as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
        }
    }

    fn occupancy_response(&self, occupancy: &[CategoryOccupancy], format: &Format) -> Response {
        let schema = Arc::new(fields(OCCUPANCY_COLUMNS, format));
        let tracker = self.service.tracker();
        let rows: Vec<PgWireResult<_>> = occupancy
            .iter()
            .map(|entry| {
                let s = &entry.summary;
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&entry.category.name)?;
                encoder.encode_field(&(entry.category.capacity as i64))?;
                encoder.encode_field(&(s.free_count as i64))?;
                encoder.encode_field(&(s.active_count as i64))?;
                encoder.encode_field(&(s.pending_count as i64))?;
                encoder.encode_field(&s.next_available.instant())?;
                encoder.encode_field(&tracker.display_next(s.next_available))?;
                Ok(encoder.take_row())
            })
            .collect();
        Response::Query(QueryResponse::new(schema, stream::iter(rows)))
    }
}

const OCCUPANCY_COLUMNS: &[(&str, Type)] = &[
    ("category", Type::VARCHAR),
    ("capacity", Type::INT8),
    ("free_count", Type::INT8),
    ("active_count", Type::INT8),
    ("pending_count", Type::INT8),
    ("next_available", Type::INT8),
    ("next_available_display", Type::VARCHAR),
];

const TRACKER_COLUMNS: &[(&str, Type)] = &[
    ("key", Type::VARCHAR),
    ("category", Type::VARCHAR),
    ("value", Type::VARCHAR),
];

const CATEGORIES_COLUMNS: &[(&str, Type)] = &[("name", Type::VARCHAR), ("capacity", Type::INT8)];

/// Field descriptions honouring the client's requested result format.
fn fields(columns: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(i))
        })
        .collect()
}

/// Result columns for a statement, judged from its text before parameters are bound.
fn result_schema(stmt: &str, format: &Format) -> Vec<FieldInfo> {
    let upper = stmt.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("OCCUPANCY") {
        fields(OCCUPANCY_COLUMNS, format)
    } else if upper.contains("TRACKER") {
        fields(TRACKER_COLUMNS, format)
    } else if upper.contains("CATEGORIES") {
        fields(CATEGORIES_COLUMNS, format)
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for DevpoolHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        tracing::debug!(query, "simple query");
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(cmd, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct DevpoolQueryParser;

#[async_trait]
impl QueryParser for DevpoolQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(
            stmt,
            column_format.unwrap_or(&Format::UnifiedText),
        ))
    }
}

#[async_trait]
impl ExtendedQueryHandler for DevpoolHandler {
    type Statement = String;
    type QueryParser = DevpoolQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = bind_params(&portal.statement.statement, &portal.parameters);
        tracing::debug!(query = %sql, "extended query");
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let responses = self
            .execute_command(cmd, &portal.result_column_format)
            .await?;
        responses.into_iter().next().ok_or_else(|| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "XX000".into(),
                "query produced no result".into(),
            )))
        })
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    sql.split('$')
        .skip(1)
        .filter_map(|rest| {
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            rest[..end].parse::<usize>().ok()
        })
        .max()
        .unwrap_or(0)
}

/// Inline bound text parameters as quoted literals. Highest index first so
/// `$1` never clobbers the prefix of `$10`.
fn bind_params<P: AsRef<[u8]>>(sql: &str, params: &[Option<P>]) -> String {
    let mut bound = sql.to_string();
    for (i, param) in params.iter().enumerate().rev() {
        let literal = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes.as_ref());
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        bound = bound.replace(&format!("${}", i + 1), &literal);
    }
    bound
}

// ── Factory ──────────────────────────────────────────────────────

pub struct DevpoolFactory {
    handler: Arc<DevpoolHandler>,
    noop: Arc<NoopHandler>,
}

impl DevpoolFactory {
    pub fn new(service: Arc<OccupancyService>) -> Self {
        Self {
            handler: Arc::new(DevpoolHandler::new(service)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for DevpoolFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.noop.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client socket until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    service: Arc<OccupancyService>,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(DevpoolFactory::new(service));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn service_err(e: ServiceError) -> PgWireError {
    let code = match &e {
        ServiceError::Snapshot(_) => {
            tracing::warn!("{e}");
            "58030"
        }
        ServiceError::UnknownCategory(_) => "42704",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match e {
        SqlError::UnknownTable(_) => "42P01",
        _ => "42601",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}
