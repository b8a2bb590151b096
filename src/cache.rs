use std::ops::DerefMut;
use std::time::Duration;

use failsafe::backoff::{self, Constant};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{CircuitBreaker, Config, StateMachine};
use r2d2_redis::r2d2;
use r2d2_redis::redis::{Commands, Connection, RedisError};
use r2d2_redis::RedisConnectionManager;

use crate::models::Ingredient;

pub type RedisPool = r2d2::Pool<RedisConnectionManager>;

type CacheBreaker = StateMachine<ConsecutiveFailures<Constant>, ()>;

const CACHE_POOL_MAX_OPEN: u32 = 16;
const CACHE_POOL_MIN_IDLE: u32 = 8;
const CACHE_POOL_EXPIRE_SECONDS: u64 = 60;
const CACHE_POOL_CONNECTION_TIMEOUT_SECONDS: u64 = 1;
const CACHE_FAILURES_BEFORE_OPEN: u32 = 2;
const CACHE_RETRY_AFTER_SECONDS: u64 = 30;

const ALL_INGREDIENTS_KEY: &str = "foodgram:ingredients:all";

/// Result of reading the catalogue from Redis.
#[derive(Debug)]
pub enum Lookup {
    Hit(Vec<Ingredient>),
    Miss,
    /// Redis failed or its breaker is open; skip writing back.
    Unavailable,
}

/// Redis copy of the ingredient catalogue.
///
/// The catalogue is read on every keystroke of the recipe form and only
/// changes through the import command. Every failure here is logged and
/// reported to callers as a miss so they fall back to MySQL. Redis has a
/// breaker of its own: after repeated failures it is left alone for a while
/// instead of costing each request a connection timeout.
#[derive(Clone)]
pub struct IngredientCache {
    pool: RedisPool,
    ttl_seconds: usize,
    circuit_breaker: CacheBreaker,
}

impl IngredientCache {
    pub fn new(redis_url: &str, ttl_seconds: usize) -> Result<Self, RedisError> {
        let manager = RedisConnectionManager::new(redis_url)?;
        let pool = r2d2::Pool::builder()
            .max_size(CACHE_POOL_MAX_OPEN)
            .max_lifetime(Some(Duration::from_secs(CACHE_POOL_EXPIRE_SECONDS)))
            .min_idle(Some(CACHE_POOL_MIN_IDLE))
            .connection_timeout(Duration::from_secs(CACHE_POOL_CONNECTION_TIMEOUT_SECONDS))
            .build_unchecked(manager);
        let circuit_breaker = Config::new()
            .failure_policy(failure_policy::consecutive_failures(
                CACHE_FAILURES_BEFORE_OPEN,
                backoff::constant(Duration::from_secs(CACHE_RETRY_AFTER_SECONDS)),
            ))
            .build();
        Ok(Self {
            pool,
            ttl_seconds,
            circuit_breaker,
        })
    }

    /// Runs one Redis command on a pooled connection, through the breaker.
    fn call<F, R>(&self, command: F) -> Result<R, String>
    where
        F: FnOnce(&mut Connection) -> Result<R, RedisError>,
    {
        let pool = &self.pool;
        let result = self.circuit_breaker.call(|| -> Result<R, String> {
            let mut redis_conn = pool.get().map_err(|e| e.to_string())?;
            command(redis_conn.deref_mut()).map_err(|e| e.to_string())
        });
        match result {
            Ok(value) => Ok(value),
            Err(failsafe::Error::Inner(err)) => Err(err),
            Err(failsafe::Error::Rejected) => Err("circuit breaker is open".to_string()),
        }
    }

    pub fn load(&self) -> Lookup {
        let bytes = match self.call(|conn| conn.get::<_, Vec<u8>>(ALL_INGREDIENTS_KEY)) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("skipping ingredient cache: {}", err);
                return Lookup::Unavailable;
            }
        };
        //an absent key comes back as an empty value
        if bytes.is_empty() {
            return Lookup::Miss;
        }
        match Ingredient::list_from_u8(&bytes) {
            Ok(list) => Lookup::Hit(list),
            Err(err) => {
                log::warn!("discarding unreadable ingredient cache entry: {}", err);
                self.invalidate();
                Lookup::Miss
            }
        }
    }

    pub fn store(&self, ingredients: &[Ingredient]) {
        let bytes = match Ingredient::list_to_u8(ingredients) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("could not encode ingredients for cache: {}", err);
                return;
            }
        };
        let ttl_seconds = self.ttl_seconds;
        let result =
            self.call(|conn| conn.set_ex::<_, _, ()>(ALL_INGREDIENTS_KEY, bytes, ttl_seconds));
        if let Err(err) = result {
            log::warn!("ingredient cache write failed: {}", err);
        }
    }

    pub fn invalidate(&self) {
        let result = self.call(|conn| conn.del::<_, ()>(ALL_INGREDIENTS_KEY));
        match result {
            Ok(()) => log::info!("ingredient cache invalidated"),
            Err(err) => log::warn!("ingredient cache invalidation failed: {}", err),
        }
    }
}
