use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as _, Transaction};
use tracing::{debug, info, warn};

use crate::libs::column::decode_column;
use crate::libs::config::PoolConfig;
use crate::libs::error::{OrmError, Result};

/// A result row: column name → value, in select-list order.
pub type Row = serde_json::Map<String, Value>;

/// Executes templated SQL on behalf of the query and mutation methods.
///
/// Statements use `?` as positional placeholder; implementations translate
/// to whatever the engine expects.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Run a query and return up to `size` rows (`None` or `Some(0)` = all).
    async fn select(&self, sql: &str, args: &[Value], size: Option<usize>) -> Result<Vec<Row>>;

    /// Run a statement and return the affected row count. With
    /// `autocommit = false` the statement runs in its own transaction.
    async fn execute(&self, sql: &str, args: &[Value], autocommit: bool) -> Result<u64>;
}

/// A statement and its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

/// An open transaction on one connection.
///
/// `commit` and `rollback` consume the scope, so it cannot be used after
/// either.
#[async_trait]
pub trait TransactionScope: Send {
    async fn run(&mut self, sql: &str, args: &[Value]) -> Result<u64>;
    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

/// Run `statements` in order inside `scope`.
///
/// Commits when all succeed and returns the summed affected rows. On the
/// first failure the scope is rolled back before the error is returned; a
/// failing rollback is logged and the original error still wins.
pub async fn run_atomically<S: TransactionScope>(
    mut scope: S,
    statements: &[Statement],
) -> Result<u64> {
    let mut affected = 0;
    for statement in statements {
        match scope.run(&statement.sql, &statement.args).await {
            Ok(n) => affected += n,
            Err(err) => {
                if let Err(rollback_err) = scope.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                return Err(err);
            }
        }
    }
    scope.commit().await?;
    Ok(affected)
}

#[async_trait]
impl TransactionScope for Transaction<'static, MySql> {
    async fn run(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        let sql = native_sql(sql, args.len())?;
        debug!(sql = %sql, ?args, "execute in transaction");
        let result = bind_all(sqlx::query(&sql), args)
            .execute(&mut **self)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        Transaction::commit(self).await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Transaction::rollback(self).await?;
        Ok(())
    }
}

/// Pooled MySQL gateway.
///
/// ```no_run
/// # async fn demo() -> minorm::Result<()> {
/// use minorm::{OrmPool, PoolConfig};
///
/// let pool = OrmPool::create_pool(&PoolConfig::new("www-data", "www-data", "awesome")).await?;
/// pool.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OrmPool {
    pool: MySqlPool,
}

impl OrmPool {
    /// Validate `config` and open the pool.
    pub async fn create_pool(config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        info!(
            host = %config.host,
            port = config.port,
            database = config.database.as_deref().unwrap_or_default(),
            max = config.max_pool_size,
            min = config.min_pool_size,
            "create database connection pool"
        );

        let autocommit = config.autocommit;
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_pool_size)
            .min_connections(config.min_pool_size)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if !autocommit {
                        sqlx::query("SET autocommit = 0").execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(config.connect_options()?)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an already configured sqlx pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Begin a transaction on a pooled connection. Dropping it without
    /// committing rolls it back.
    pub async fn transaction(&self) -> Result<Transaction<'static, MySql>> {
        Ok(self.pool.begin().await?)
    }

    /// Run several statements as one unit of work.
    pub async fn execute_batch(&self, statements: &[Statement]) -> Result<u64> {
        let tx = self.transaction().await?;
        run_atomically(tx, statements).await
    }

    /// Close every connection; later acquires fail.
    pub async fn close(&self) {
        info!("close database connection pool");
        self.pool.close().await;
    }
}

#[async_trait]
impl Gateway for OrmPool {
    async fn select(&self, sql: &str, args: &[Value], size: Option<usize>) -> Result<Vec<Row>> {
        let sql = native_sql(sql, args.len())?;
        debug!(sql = %sql, ?args, "select");

        let mut conn = self.pool.acquire().await?;
        let query = bind_all(sqlx::query(&sql), args);
        let rows = match size {
            Some(limit) if limit > 0 => {
                let mut rows = Vec::with_capacity(limit);
                let mut stream = query.fetch(&mut *conn);
                while rows.len() < limit {
                    match stream.try_next().await? {
                        Some(row) => rows.push(row_to_map(&row)?),
                        None => break,
                    }
                }
                rows
            }
            _ => query
                .fetch_all(&mut *conn)
                .await?
                .iter()
                .map(row_to_map)
                .collect::<Result<Vec<_>>>()?,
        };
        info!(rows = rows.len(), "rows returned");
        Ok(rows)
    }

    async fn execute(&self, sql: &str, args: &[Value], autocommit: bool) -> Result<u64> {
        if !autocommit {
            let statement = Statement::new(sql, args.to_vec());
            return self.execute_batch(std::slice::from_ref(&statement)).await;
        }

        let sql = native_sql(sql, args.len())?;
        debug!(sql = %sql, ?args, "execute");
        let mut conn = self.pool.acquire().await?;
        let result = bind_all(sqlx::query(&sql), args)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Rewrite `?` markers into the engine's native form and check that the
/// statement takes exactly `arg_count` arguments.
///
/// Markers inside quoted strings, backtick identifiers and comments (`-- `,
/// `#`, `/* */`) are left alone. `/*! */` bodies are run by MySQL, so their
/// markers count. MySQL's native marker is itself `?`, so only the count is
/// enforced there.
pub fn native_sql(sql: &str, arg_count: usize) -> Result<String> {
    #[derive(Clone, Copy)]
    enum Scan {
        Code,
        Quoted { quote: char, escaped: bool },
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(sql.len());
    let mut markers = 0;
    let mut state = Scan::Code;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        out.push(ch);
        match state {
            Scan::Quoted { quote, escaped } => {
                if escaped {
                    state = Scan::Quoted {
                        quote,
                        escaped: false,
                    };
                } else if ch == '\\' && quote != '`' {
                    state = Scan::Quoted {
                        quote,
                        escaped: true,
                    };
                } else if ch == quote {
                    state = Scan::Code;
                }
            }
            Scan::LineComment => {
                if ch == '\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment => {
                if ch == '*' && chars.next_if_eq(&'/').is_some() {
                    out.push('/');
                    state = Scan::Code;
                }
            }
            Scan::Code => match ch {
                '\'' | '"' | '`' => {
                    state = Scan::Quoted {
                        quote: ch,
                        escaped: false,
                    }
                }
                '#' => state = Scan::LineComment,
                // `--` only opens a comment when followed by whitespace
                '-' if chars.peek() == Some(&'-')
                    && chars.clone().nth(1).is_none_or(char::is_whitespace) =>
                {
                    chars.next();
                    out.push('-');
                    state = Scan::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push('*');
                    if chars.peek() != Some(&'!') {
                        state = Scan::BlockComment;
                    }
                }
                '?' => markers += 1,
                _ => {}
            },
        }
    }

    if markers != arg_count {
        return Err(OrmError::invalid_argument(format!(
            "statement has {markers} placeholder(s) but {arg_count} argument(s) were given"
        )));
    }
    Ok(out)
}

/// How a JSON argument is handed to the driver.
#[derive(Debug, Clone, PartialEq)]
enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl From<&Value> for BindValue {
    /// Arrays and objects are sent as their JSON text.
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    BindValue::UInt(u)
                } else {
                    n.as_f64().map_or(BindValue::Null, BindValue::Float)
                }
            }
            Value::String(s) => BindValue::Text(s.clone()),
            other => BindValue::Text(other.to_string()),
        }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    args: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for v in args {
        query = match BindValue::from(v) {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(b) => query.bind(b),
            BindValue::Int(i) => query.bind(i),
            BindValue::UInt(u) => query.bind(u),
            BindValue::Float(f) => query.bind(f),
            BindValue::Text(s) => query.bind(s),
        };
    }
    query
}

fn row_to_map(row: &MySqlRow) -> Result<Row> {
    let mut map = Row::new();
    for (index, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), decode_column(row, index)?);
    }
    Ok(map)
}
