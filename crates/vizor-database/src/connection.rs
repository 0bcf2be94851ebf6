//! PostgreSQL 连接管理与文档存储实现
//!
//! 所有集合共用一张 `documents` 表，文档内容存为 JSONB。

use crate::store::{check_batch_size, BatchOp, MetadataStore, OrderDirection, Query, StoredDocument};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use vizor_core::config::DatabaseSettings;
use vizor_core::{Result, VizorError};

fn db_err(e: sqlx::Error) -> VizorError {
    VizorError::Database(e.to_string())
}

/// 数据库连接池
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// 按配置建立连接池并确保表结构存在
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| VizorError::Config("未配置 database.url".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;

        let db = Self { pool };
        db.create_tables().await?;
        info!("Database connected, pool size {}", settings.max_connections);
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 创建文档表与常用字段索引
    pub async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection VARCHAR(64) NOT NULL,
                id VARCHAR(128) NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                PRIMARY KEY (collection, id)
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_documents_data ON documents USING GIN (data jsonb_path_ops)",
            "CREATE INDEX IF NOT EXISTS idx_documents_study_id ON documents ((data ->> 'study_id'))",
            "CREATE INDEX IF NOT EXISTS idx_documents_user_id ON documents ((data ->> 'user_id'))",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }

        debug!("Document tables ready");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for DatabasePool {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let data: Option<Json<Value>> =
            sqlx::query_scalar("SELECT data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(data.map(|Json(value)| value))
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (collection, id)
            DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
        "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(data))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn merge_set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (collection, id)
            DO UPDATE SET data = documents.data || EXCLUDED.data, updated_at = NOW()
        "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(data))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<StoredDocument>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
        qb.push_bind(query.collection.clone());

        for (field, value) in &query.filters {
            qb.push(" AND data -> ");
            qb.push_bind(field.clone());
            qb.push(" = ");
            qb.push_bind(Json(value.clone()));
        }

        match &query.order_by {
            Some((field, direction)) => {
                qb.push(" ORDER BY data -> ");
                qb.push_bind(field.clone());
                qb.push(match direction {
                    OrderDirection::Ascending => " ASC NULLS FIRST, id ASC",
                    OrderDirection::Descending => " DESC NULLS LAST, id ASC",
                });
            }
            None => {
                qb.push(" ORDER BY id ASC");
            }
        }

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(db_err)?;
                let Json(data): Json<Value> = row.try_get("data").map_err(db_err)?;
                Ok(StoredDocument { id, data })
            })
            .collect()
    }

    async fn batch_write(&self, ops: Vec<BatchOp>) -> Result<()> {
        check_batch_size(&ops)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for op in ops {
            match op {
                BatchOp::Set { collection, id, data } => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, data, updated_at)
                        VALUES ($1, $2, $3, NOW())
                        ON CONFLICT (collection, id)
                        DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
                    "#,
                    )
                    .bind(collection)
                    .bind(id)
                    .bind(Json(data))
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
                BatchOp::Delete { collection, id } => {
                    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                        .bind(collection)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                }
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
