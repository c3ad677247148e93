use super::{CommitReceipt, SaveBatch, TranslationStorage};
use crate::error::StorageError;
use crate::locale::Locale;
use crate::query::sql::{
    quote_ident, KEY_COLUMN, LOCALE_COLUMN, OWNER_ID_COLUMN, OWNER_TYPE_COLUMN, VALUE_COLUMN,
};
use crate::query::TranslationQuery;
use crate::record::{OwnerRef, TranslationRecord};
use crate::shape::ShapeRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Postgres storage engine over a sqlx pool.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create every registered shape's table and its indexes if missing.
    pub async fn ensure_schema(&self, shapes: &ShapeRegistry) -> Result<(), StorageError> {
        for shape in shapes.all() {
            let table = quote_ident(&shape.table);
            let create = format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    {owner_type} VARCHAR NOT NULL,
                    {owner_id} BIGINT NOT NULL,
                    \"{key}\" VARCHAR NOT NULL,
                    {locale} VARCHAR NOT NULL,
                    {value} {value_type} COLLATE \"C\",
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                )",
                table = table,
                owner_type = OWNER_TYPE_COLUMN,
                owner_id = OWNER_ID_COLUMN,
                key = KEY_COLUMN,
                locale = LOCALE_COLUMN,
                value = VALUE_COLUMN,
                value_type = shape.kind.sql_type(),
            );
            sqlx::query(&create).execute(&self.pool).await?;

            let unique = format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({}, {}, \"{}\", {})",
                quote_ident(&format!("index_{}_on_owner_key_locale", shape.table)),
                table,
                OWNER_TYPE_COLUMN,
                OWNER_ID_COLUMN,
                KEY_COLUMN,
                LOCALE_COLUMN
            );
            sqlx::query(&unique).execute(&self.pool).await?;

            info!("✓ Translation table {} ready", shape.table);
        }
        Ok(())
    }
}

fn row_to_record(row: &PgRow) -> Result<TranslationRecord, sqlx::Error> {
    Ok(TranslationRecord {
        id: Some(row.try_get::<i64, _>("id")?),
        owner: OwnerRef::new(
            row.try_get::<String, _>(OWNER_TYPE_COLUMN)?,
            row.try_get::<i64, _>(OWNER_ID_COLUMN)?,
        ),
        key: row.try_get(KEY_COLUMN)?,
        locale: Locale::new(row.try_get::<String, _>(LOCALE_COLUMN)?),
        value: row.try_get(VALUE_COLUMN)?,
        created_at: Some(row.try_get::<DateTime<Utc>, _>("created_at")?),
        updated_at: Some(row.try_get::<DateTime<Utc>, _>("updated_at")?),
    })
}

fn map_insert_error(e: sqlx::Error, table: &str, record: &TranslationRecord) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::UniqueViolation {
                table: table.to_string(),
                owner_type: record.owner.owner_type.clone(),
                owner_id: record.owner.owner_id,
                key: record.key.clone(),
                locale: record.locale.to_string(),
            };
        }
    }
    StorageError::Database(e)
}

#[async_trait]
impl TranslationStorage for PgStorage {
    async fn load(
        &self,
        table: &str,
        owner: &OwnerRef,
        keys: &BTreeSet<String>,
    ) -> Result<Vec<TranslationRecord>, StorageError> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = $1 AND {} = $2 AND \"{}\" = ANY($3) ORDER BY id",
            quote_ident(table),
            OWNER_TYPE_COLUMN,
            OWNER_ID_COLUMN,
            KEY_COLUMN
        );
        let keys: Vec<String> = keys.iter().cloned().collect();
        let rows = sqlx::query(&sql)
            .bind(&owner.owner_type)
            .bind(owner.owner_id)
            .bind(&keys)
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn commit(&self, batch: &SaveBatch) -> Result<CommitReceipt, StorageError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut inserted_ids = Vec::with_capacity(batch.tables.len());

        for changes in &batch.tables {
            let table = quote_ident(&changes.table);

            if !changes.deletes.is_empty() {
                let sql = format!("DELETE FROM {} WHERE id = ANY($1)", table);
                sqlx::query(&sql)
                    .bind(&changes.deletes)
                    .execute(&mut *tx)
                    .await?;
            }

            let update = format!(
                "UPDATE {} SET {} = $1, updated_at = $2 WHERE id = $3",
                table, VALUE_COLUMN
            );
            for record in &changes.updates {
                let Some(id) = record.id else { continue };
                sqlx::query(&update)
                    .bind(&record.value)
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }

            let insert = format!(
                "INSERT INTO {} ({}, {}, \"{}\", {}, {}, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING id",
                table, OWNER_TYPE_COLUMN, OWNER_ID_COLUMN, KEY_COLUMN, LOCALE_COLUMN, VALUE_COLUMN
            );
            let mut ids = Vec::with_capacity(changes.inserts.len());
            for record in &changes.inserts {
                let id: i64 = sqlx::query_scalar(&insert)
                    .bind(&record.owner.owner_type)
                    .bind(record.owner.owner_id)
                    .bind(&record.key)
                    .bind(record.locale.as_str())
                    .bind(&record.value)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_insert_error(e, &changes.table, record))?;
                ids.push(id);
            }
            inserted_ids.push(ids);
        }

        // Dropping `tx` on any early return above rolls everything back
        tx.commit().await?;
        debug!("Committed {} write(s)", batch.write_count());

        Ok(CommitReceipt {
            inserted_ids,
            committed_at: now,
        })
    }

    async fn delete_owner(&self, table: &str, owner: &OwnerRef) -> Result<u64, StorageError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1 AND {} = $2",
            quote_ident(table),
            OWNER_TYPE_COLUMN,
            OWNER_ID_COLUMN
        );
        let result = sqlx::query(&sql)
            .bind(&owner.owner_type)
            .bind(owner.owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn matching_owners(&self, query: &TranslationQuery) -> Result<Vec<i64>, StorageError> {
        let mut builder = query.to_sql();
        let ids = builder
            .build_query_scalar::<i64>()
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
