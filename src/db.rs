use std::time::Duration;

use actix_web::web;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use failsafe::backoff::EqualJittered;
use failsafe::failure_policy::{ConsecutiveFailures, OrElse, SuccessRateOverTimeWindow};
use failsafe::{CircuitBreaker, Config, StateMachine};

use crate::error::ApiError;

pub type DbPool = r2d2::Pool<ConnectionManager<MysqlConnection>>;

pub(crate) type CircuitBreakerType = StateMachine<
    OrElse<SuccessRateOverTimeWindow<EqualJittered>, ConsecutiveFailures<EqualJittered>>,
    (),
>;

const DB_POOL_CONNECTION_TIMEOUT_SECONDS: u64 = 5;

embed_migrations!("migrations");

/// MySQL access for request handlers.
///
/// Diesel is synchronous, so every call is shipped to the blocking pool and
/// wrapped in a circuit breaker: once the database keeps failing, requests
/// are rejected straight away instead of queueing on dead connections.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    circuit_breaker: CircuitBreakerType,
}

impl Database {
    /// Builds the pool without opening connections, so the server can start
    /// while MySQL is still coming up.
    pub fn new(database_url: &str, pool_size: u32) -> Self {
        let manager = ConnectionManager::<MysqlConnection>::new(database_url);
        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(DB_POOL_CONNECTION_TIMEOUT_SECONDS))
            .build_unchecked(manager);
        Self {
            pool,
            circuit_breaker: Config::new().build(),
        }
    }

    pub async fn run<F, R>(&self, f: F) -> Result<R, ApiError>
    where
        F: FnOnce(&MysqlConnection) -> Result<R, ApiError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.clone();
        web::block(move || db.run_blocking(f)).await?
    }

    /// Same as [`Database::run`] for callers already off the async runtime.
    pub fn run_blocking<F, R>(&self, f: F) -> Result<R, ApiError>
    where
        F: FnOnce(&MysqlConnection) -> Result<R, ApiError>,
    {
        if !self.circuit_breaker.is_call_permitted() {
            log::warn!("circuit breaker is open, rejecting database call");
            return Err(ApiError::Unavailable);
        }
        let pool = &self.pool;
        let result = self.circuit_breaker.call_with(
            |err: &ApiError| err.is_outage(),
            || -> Result<R, ApiError> {
                let conn = pool.get()?;
                f(&*conn)
            },
        );
        match result {
            Ok(value) => Ok(value),
            Err(failsafe::Error::Inner(err)) => Err(err),
            //rejected means the database is not responsive
            Err(failsafe::Error::Rejected) => Err(ApiError::Unavailable),
        }
    }

    pub fn run_migrations(&self) -> Result<(), anyhow::Error> {
        let conn = self.pool.get()?;
        embedded_migrations::run_with_output(&*conn, &mut std::io::stdout())?;
        Ok(())
    }
}

no_arg_sql_function!(
    last_insert_id,
    diesel::sql_types::Unsigned<diesel::sql_types::BigInt>
);

/// Id of the row most recently inserted on this connection.
pub(crate) fn last_inserted_id(conn: &MysqlConnection) -> QueryResult<i32> {
    let id = diesel::select(last_insert_id).get_result::<u64>(conn)?;
    Ok(id as i32)
}
