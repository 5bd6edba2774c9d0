//! Pool provider abstraction for read/write routing.
//!
//! [`PostgresStorage`](super::PostgresStorage) never picks a pool itself. Every
//! query goes through a [`PoolProvider`], which hands out:
//! - `read()` for listings, lookups and queue counts (may be a replica)
//! - `write()` for inserts, conditional status updates and deletes
//!
//! A plain [`PgPool`] serves both. [`TestDbPools`] backs tests with a read-only
//! second pool so a write routed through `read()` fails loudly.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Trait for providing database pools with read/write routing.
///
/// # Example
///
/// ```ignore
/// use registrar::PoolProvider;
/// use sqlx::PgPool;
///
/// #[derive(Clone)]
/// struct CampusPools {
///     primary: PgPool,
///     replica: Option<PgPool>,
/// }
///
/// impl PoolProvider for CampusPools {
///     fn read(&self) -> &PgPool {
///         self.replica.as_ref().unwrap_or(&self.primary)
///     }
///
///     fn write(&self) -> &PgPool {
///         &self.primary
///     }
/// }
/// ```
pub trait PoolProvider: Clone + Send + Sync + 'static {
    /// Pool for queries that tolerate slight staleness.
    ///
    /// Queue estimates are advisory and status updates are conditional, so a
    /// lagging replica can only make an estimate stale or turn a transition
    /// into an `InvalidState` error, never corrupt a request.
    fn read(&self) -> &PgPool;

    /// Pool for every write and for reads that must see the latest write.
    fn write(&self) -> &PgPool;
}

impl PoolProvider for PgPool {
    fn read(&self) -> &PgPool {
        self
    }

    fn write(&self) -> &PgPool {
        self
    }
}

/// Test pool provider with read-only replica enforcement.
///
/// Both pools point at the same database; the replica sets
/// `default_transaction_read_only = on`, so PostgreSQL rejects any write
/// issued through `read()` with "cannot execute ... in a read-only transaction".
///
/// # Example
///
/// ```ignore
/// #[sqlx::test]
/// async fn test_something(pool: PgPool) {
///     let pools = TestDbPools::new(pool).await.unwrap();
///     let storage = PostgresStorage::new(pools);
/// }
/// ```
#[derive(Clone, Debug)]
pub struct TestDbPools {
    primary: PgPool,
    replica: PgPool,
}

impl TestDbPools {
    /// Build the primary/replica pair from one pool.
    pub async fn new(pool: PgPool) -> Result<Self, sqlx::Error> {
        let primary = pool.clone();

        let replica = PgPoolOptions::new()
            .max_connections(pool.options().get_max_connections())
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET default_transaction_read_only = on")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(pool.connect_options().as_ref().clone())
            .await?;

        Ok(Self { primary, replica })
    }
}

impl PoolProvider for TestDbPools {
    fn read(&self) -> &PgPool {
        &self.replica
    }

    fn write(&self) -> &PgPool {
        &self.primary
    }
}
