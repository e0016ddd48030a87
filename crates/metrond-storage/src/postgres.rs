//! PostgreSQL backend.
//!
//! A pooled SeaORM connection; embedded migrations run at startup and are
//! a no-op when already applied. Every public call wraps its SQL body in
//! the retry engine with the Postgres classifier. Insert and update each
//! run inside a single transaction and roll back on any per-row failure.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    TransactionTrait,
};
use tokio_util::sync::CancellationToken;

use metrond_common::metric::{Metric, MetricType};
use metrond_common::retry;

use crate::classify::classify_db;
use crate::entities::metric::{ActiveModel, Column, Entity as MetricEntity, Model};
use crate::{Storage, StorageError};

const POOL_MAX_CONNS: u32 = 5;
const POOL_MIN_CONNS: u32 = 1;
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub struct PgStorage {
    db: DatabaseConnection,
    shutdown: CancellationToken,
}

impl PgStorage {
    /// Connects, verifies reachability and applies pending migrations.
    /// The token aborts retry backoffs on shutdown.
    pub async fn connect(dsn: &str, shutdown: CancellationToken) -> Result<Self, StorageError> {
        let mut options = ConnectOptions::new(dsn.to_owned());
        options
            .max_connections(POOL_MAX_CONNS)
            .min_connections(POOL_MIN_CONNS)
            .max_lifetime(POOL_MAX_LIFETIME)
            .idle_timeout(POOL_IDLE_TIMEOUT)
            .test_before_acquire(true);

        let db = Database::connect(options).await?;
        db.ping().await?;

        Migrator::up(&db, None).await?;
        tracing::info!("database migrations applied");

        Ok(Self { db, shutdown })
    }

    fn to_row(metric: &Metric) -> ActiveModel {
        ActiveModel {
            id: Set(metric.id.clone()),
            mtype: Set(metric.mtype.to_string()),
            value: Set(metric.value),
            delta: Set(metric.delta),
            value_str: Set(Some(metric.value_str())),
        }
    }

    fn from_row(row: Model) -> Result<Metric, StorageError> {
        let mtype = row
            .mtype
            .parse::<MetricType>()
            .map_err(|_| StorageError::Corrupt(format!("bad mtype for id={}", row.id)))?;
        Ok(Metric {
            id: row.id,
            mtype,
            delta: row.delta,
            value: row.value,
        })
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        self.db.ping().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.db.clone().close().await?;
        Ok(())
    }

    async fn insert(&self, metrics: Vec<Metric>) -> Result<(), StorageError> {
        retry::run(&self.shutdown, classify_db, || {
            let rows: Vec<ActiveModel> = metrics.iter().map(Self::to_row).collect();
            let db = self.db.clone();
            async move {
                let txn = db.begin().await?;
                MetricEntity::insert_many(rows).exec(&txn).await?;
                txn.commit().await?;
                Ok::<_, DbErr>(())
            }
        })
        .await?;
        Ok(())
    }

    async fn update(&self, metrics: Vec<Metric>) -> Result<(), StorageError> {
        retry::run(&self.shutdown, classify_db, || {
            let rows: Vec<ActiveModel> = metrics.iter().map(Self::to_row).collect();
            let db = self.db.clone();
            async move {
                let txn = db.begin().await?;
                for row in rows {
                    MetricEntity::update(row).exec(&txn).await?;
                }
                txn.commit().await?;
                Ok::<_, DbErr>(())
            }
        })
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str, mtype: MetricType) -> Result<Option<Metric>, StorageError> {
        let row = retry::run_with_result(&self.shutdown, classify_db, || {
            let db = self.db.clone();
            let id = id.to_owned();
            async move {
                MetricEntity::find_by_id(id)
                    .filter(Column::Mtype.eq(mtype.to_string()))
                    .one(&db)
                    .await
            }
        })
        .await?;

        row.map(Self::from_row).transpose()
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<HashMap<String, Metric>, StorageError> {
        let rows = retry::run_with_result(&self.shutdown, classify_db, || {
            let db = self.db.clone();
            let ids = ids.to_vec();
            async move {
                MetricEntity::find()
                    .filter(Column::Id.is_in(ids))
                    .all(&db)
                    .await
            }
        })
        .await?;

        let mut found = HashMap::with_capacity(rows.len());
        for row in rows {
            let metric = Self::from_row(row)?;
            found.insert(metric.id.clone(), metric);
        }
        Ok(found)
    }

    async fn get_all(&self) -> Result<Vec<Metric>, StorageError> {
        let rows = retry::run_with_result(&self.shutdown, classify_db, || {
            let db = self.db.clone();
            async move { MetricEntity::find().all(&db).await }
        })
        .await?;

        rows.into_iter().map(Self::from_row).collect()
    }
}
