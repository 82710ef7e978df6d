//! Scoped PostgreSQL session.

use std::future::Future;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::backend::StorageBackend;
use crate::error::{Result, StorageError};
use crate::ident::quote_ident;
use crate::postgres::{PgCatalog, PgGridSink};

/// Connection settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl StorageConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
        }
    }
}

/// A connection pool owned by one ingestion run.
///
/// Cloning shares the pool. Use [`StorageSession::scoped`] so the pool is
/// closed once the run finishes, whatever its outcome.
#[derive(Clone)]
pub struct StorageSession {
    pool: PgPool,
}

impl StorageSession {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Connect, run `f` with the session, then close the pool.
    pub async fn scoped<F, Fut, T, E>(config: &StorageConfig, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(StorageSession) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<StorageError>,
    {
        let session = Self::connect(config).await?;
        let result = f(session.clone()).await;
        session.close().await;
        result
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create the catalog tables and enums if they do not exist.
    pub async fn bootstrap(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        info!("Catalog schema ready");
        Ok(())
    }

    /// Enable the `h3` extension providing the `h3index` type.
    ///
    /// Returns `false` when the extension is not installed on the server.
    pub async fn ensure_h3_extension(&self) -> Result<bool> {
        match sqlx::query("CREATE EXTENSION IF NOT EXISTS h3")
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) => {
                warn!(error = %e, "h3 extension unavailable, use key_type text");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StorageBackend for StorageSession {
    type Sink = PgGridSink;
    type Catalog = PgCatalog;

    async fn grid_sink(&self) -> Result<PgGridSink> {
        Ok(PgGridSink::new(self.pool.begin().await?))
    }

    async fn catalog(&self) -> Result<PgCatalog> {
        Ok(PgCatalog::new(self.pool.begin().await?))
    }

    async fn list_tables(&self, prefix: &str) -> Result<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tables
            .into_iter()
            .filter(|t| t.starts_with(prefix))
            .collect())
    }

    async fn registered_tables(&self) -> Result<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(
            r#"SELECT DISTINCT "h3tableName" FROM h3_data ORDER BY "h3tableName""#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             AND column_name <> 'h3index' \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(columns)
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table)?);
        sqlx::query(&sql).execute(&self.pool).await?;
        info!(table = %table, "Dropped table");
        Ok(())
    }
}

/// Development catalog schema.
///
/// Mirrors the platform tables the importer writes to. Production databases
/// are migrated by the platform itself.
const SCHEMA_SQL: &str = r#"
DO $$ BEGIN
    CREATE TYPE contextual_layer_category_enum AS ENUM (
        'Environmental datasets', 'Business datasets', 'Food and agriculture', 'Default'
    );
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

DO $$ BEGIN
    CREATE TYPE material_to_h3_type_enum AS ENUM ('producer', 'harvest');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

CREATE TABLE IF NOT EXISTS contextual_layer (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    "name" VARCHAR NOT NULL UNIQUE,
    "metadata" JSONB,
    "category" contextual_layer_category_enum NOT NULL DEFAULT 'Default',
    "tilerUrl" VARCHAR,
    "defaultTilerParams" JSONB
);

CREATE TABLE IF NOT EXISTS indicator (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    "name" VARCHAR,
    "nameCode" VARCHAR
);

CREATE TABLE IF NOT EXISTS material (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    "name" VARCHAR,
    "datasetId" VARCHAR,
    "parentId" UUID REFERENCES material(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS h3_data (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    "h3tableName" VARCHAR NOT NULL,
    "h3columnName" VARCHAR NOT NULL,
    "h3resolution" INTEGER NOT NULL,
    "year" INTEGER,
    "indicatorId" UUID REFERENCES indicator(id) ON DELETE CASCADE,
    "contextualLayerId" UUID REFERENCES contextual_layer(id) ON DELETE SET NULL,
    UNIQUE ("h3tableName", "h3columnName")
);

CREATE TABLE IF NOT EXISTS material_to_h3 (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    "materialId" UUID NOT NULL REFERENCES material(id) ON DELETE CASCADE,
    "h3DataId" UUID NOT NULL REFERENCES h3_data(id) ON DELETE CASCADE,
    "type" material_to_h3_type_enum NOT NULL,
    UNIQUE ("materialId", "type")
);

CREATE TABLE IF NOT EXISTS material_indicator_to_h3 (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    "materialId" UUID NOT NULL REFERENCES material(id) ON DELETE CASCADE,
    "indicatorId" UUID NOT NULL REFERENCES indicator(id) ON DELETE CASCADE,
    "h3DataId" UUID NOT NULL REFERENCES h3_data(id) ON DELETE CASCADE,
    UNIQUE ("materialId")
);

CREATE INDEX IF NOT EXISTS idx_h3_data_table ON h3_data("h3tableName");
CREATE INDEX IF NOT EXISTS idx_material_dataset ON material("datasetId");
"#;
