//! PostgreSQL grid sink and catalog store.

use async_trait::async_trait;
use h3_grid::{GridBatch, TableSchema, KEY_COLUMN};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{
    CatalogEntry, CatalogStore, ContextualLayer, IndicatorLink, MaterialLink, NewCatalogEntry,
};
use crate::copy::{copy_statement, encode_batch};
use crate::error::{Result, StorageError};
use crate::ident::quote_ident;
use crate::loader::GridSink;

type PgTransaction = Transaction<'static, Postgres>;

fn open<'a>(tx: &'a mut Option<PgTransaction>, what: &str) -> Result<&'a mut PgTransaction> {
    tx.as_mut()
        .ok_or_else(|| StorageError::NotInitialized(format!("{what} transaction")))
}

/// `CREATE TABLE` statement for a grid table.
pub fn create_table_sql(table: &str, schema: &TableSchema) -> Result<String> {
    let mut columns = vec![format!(
        "{} {} PRIMARY KEY",
        quote_ident(KEY_COLUMN)?,
        schema.key_type.sql_name()
    )];
    for column in &schema.columns {
        columns.push(format!(
            "{} {}",
            quote_ident(&column.name)?,
            column.storage.sql_name()
        ));
    }
    Ok(format!(
        "CREATE TABLE {} ({})",
        quote_ident(table)?,
        columns.join(", ")
    ))
}

/// Grid table writer over one transaction, loading with `COPY FROM STDIN`.
pub struct PgGridSink {
    tx: Option<PgTransaction>,
}

impl PgGridSink {
    pub fn new(tx: PgTransaction) -> Self {
        Self { tx: Some(tx) }
    }
}

#[async_trait]
impl GridSink for PgGridSink {
    async fn recreate_table(&mut self, table: &str, schema: &TableSchema) -> Result<()> {
        let drop = format!("DROP TABLE IF EXISTS {}", quote_ident(table)?);
        let create = create_table_sql(table, schema)?;
        let tx = open(&mut self.tx, "grid")?;

        sqlx::query(&drop).execute(&mut **tx).await?;
        sqlx::query(&create).execute(&mut **tx).await?;
        debug!(sql = %create, "Recreated table");
        Ok(())
    }

    async fn copy_rows(
        &mut self,
        table: &str,
        schema: &TableSchema,
        batch: &GridBatch,
    ) -> Result<u64> {
        let statement = copy_statement(table, schema)?;
        let data = encode_batch(batch);
        let tx = open(&mut self.tx, "grid")?;

        let mut copy = tx
            .copy_in_raw(&statement)
            .await
            .map_err(|e| StorageError::from_sqlx(e, table))?;
        copy.send(data.freeze())
            .await
            .map_err(|e| StorageError::from_sqlx(e, table))?;
        let rows = copy
            .finish()
            .await
            .map_err(|e| StorageError::from_sqlx(e, table))?;
        Ok(rows)
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StorageError::NotInitialized("grid transaction".into()))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

/// Catalog store over one transaction.
pub struct PgCatalog {
    tx: Option<PgTransaction>,
}

impl PgCatalog {
    pub fn new(tx: PgTransaction) -> Self {
        Self { tx: Some(tx) }
    }

    fn tx(&mut self) -> Result<&mut PgTransaction> {
        open(&mut self.tx, "catalog")
    }
}

/// Internal row type for `h3_data` queries.
#[derive(FromRow)]
struct EntryRow {
    id: Uuid,
    #[sqlx(rename = "h3tableName")]
    table: String,
    #[sqlx(rename = "h3columnName")]
    column: String,
    #[sqlx(rename = "h3resolution")]
    resolution: i32,
    year: Option<i32>,
    #[sqlx(rename = "indicatorId")]
    indicator_id: Option<Uuid>,
    #[sqlx(rename = "contextualLayerId")]
    contextual_layer_id: Option<Uuid>,
}

impl From<EntryRow> for CatalogEntry {
    fn from(row: EntryRow) -> Self {
        CatalogEntry {
            id: row.id,
            table: row.table,
            column: row.column,
            resolution: row.resolution.clamp(0, 15) as u8,
            year: row.year,
            indicator_id: row.indicator_id,
            contextual_layer_id: row.contextual_layer_id,
        }
    }
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn contextual_layer_categories(&mut self) -> Result<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT unnest(enum_range(NULL::contextual_layer_category_enum))::text",
        )
        .fetch_all(&mut **self.tx()?)
        .await?;
        Ok(categories)
    }

    async fn entries_for_table(&mut self, table: &str) -> Result<Vec<CatalogEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"SELECT id, "h3tableName", "h3columnName", "h3resolution", "year",
                      "indicatorId", "contextualLayerId"
               FROM h3_data WHERE "h3tableName" = $1 ORDER BY "h3columnName""#,
        )
        .bind(table)
        .fetch_all(&mut **self.tx()?)
        .await?;
        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn delete_links_for_table(&mut self, table: &str) -> Result<u64> {
        let tx = self.tx()?;
        let materials = sqlx::query(
            r#"DELETE FROM material_to_h3 WHERE "h3DataId" IN
               (SELECT id FROM h3_data WHERE "h3tableName" = $1)"#,
        )
        .bind(table)
        .execute(&mut **tx)
        .await?;
        let indicators = sqlx::query(
            r#"DELETE FROM material_indicator_to_h3 WHERE "h3DataId" IN
               (SELECT id FROM h3_data WHERE "h3tableName" = $1)"#,
        )
        .bind(table)
        .execute(&mut **tx)
        .await?;
        Ok(materials.rows_affected() + indicators.rows_affected())
    }

    async fn delete_entries_for_table(&mut self, table: &str) -> Result<u64> {
        let result = sqlx::query(r#"DELETE FROM h3_data WHERE "h3tableName" = $1"#)
            .bind(table)
            .execute(&mut **self.tx()?)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_entry(&mut self, entry: &NewCatalogEntry) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO h3_data
               (id, "h3tableName", "h3columnName", "h3resolution", "year", "indicatorId")
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(id)
        .bind(&entry.table)
        .bind(&entry.column)
        .bind(i32::from(entry.resolution))
        .bind(entry.year)
        .bind(entry.indicator_id)
        .execute(&mut **self.tx()?)
        .await
        .map_err(|e| StorageError::from_sqlx(e, "h3_data"))?;
        Ok(id)
    }

    async fn find_indicator(&mut self, name_code: &str) -> Result<Option<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM indicator WHERE "nameCode" = $1"#)
            .bind(name_code)
            .fetch_all(&mut **self.tx()?)
            .await?;
        if ids.len() > 1 {
            return Err(StorageError::AmbiguousLookup {
                entity: "indicator",
                key: name_code.to_string(),
                count: ids.len(),
            });
        }
        Ok(ids.into_iter().next())
    }

    async fn find_materials(&mut self, dataset_id: &str, roots_only: bool) -> Result<Vec<Uuid>> {
        let sql = if roots_only {
            r#"SELECT id FROM material WHERE "datasetId" = $1 AND "parentId" IS NULL ORDER BY id"#
        } else {
            r#"SELECT id FROM material WHERE "datasetId" = $1 ORDER BY id"#
        };
        let ids = sqlx::query_scalar::<_, Uuid>(sql)
            .bind(dataset_id)
            .fetch_all(&mut **self.tx()?)
            .await?;
        Ok(ids)
    }

    async fn replace_material_link(&mut self, link: &MaterialLink) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            r#"DELETE FROM material_to_h3
               WHERE "materialId" = $1 AND "type" = $2::material_to_h3_type_enum"#,
        )
        .bind(link.material_id)
        .bind(link.link_type.as_str())
        .execute(&mut **tx)
        .await?;
        sqlx::query(
            r#"INSERT INTO material_to_h3 ("materialId", "h3DataId", "type")
               VALUES ($1, $2, $3::material_to_h3_type_enum)"#,
        )
        .bind(link.material_id)
        .bind(link.entry_id)
        .bind(link.link_type.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| StorageError::from_sqlx(e, "material_to_h3"))?;
        Ok(())
    }

    async fn replace_indicator_link(&mut self, link: &IndicatorLink) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(r#"DELETE FROM material_indicator_to_h3 WHERE "materialId" = $1"#)
            .bind(link.material_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            r#"INSERT INTO material_indicator_to_h3 ("materialId", "indicatorId", "h3DataId")
               VALUES ($1, $2, $3)"#,
        )
        .bind(link.material_id)
        .bind(link.indicator_id)
        .bind(link.entry_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| StorageError::from_sqlx(e, "material_indicator_to_h3"))?;
        Ok(())
    }

    async fn replace_contextual_layer(&mut self, layer: &ContextualLayer) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let tx = self.tx()?;
        sqlx::query(r#"DELETE FROM contextual_layer WHERE "name" = $1"#)
            .bind(&layer.name)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            r#"INSERT INTO contextual_layer
               (id, "name", "metadata", "category", "tilerUrl", "defaultTilerParams")
               VALUES ($1, $2, $3, $4::contextual_layer_category_enum, $5, $6)"#,
        )
        .bind(id)
        .bind(&layer.name)
        .bind(&layer.metadata)
        .bind(&layer.category)
        .bind(&layer.tiler_url)
        .bind(&layer.default_tiler_params)
        .execute(&mut **tx)
        .await
        .map_err(|e| StorageError::from_sqlx(e, "contextual_layer"))?;
        Ok(id)
    }

    async fn attach_contextual_layer(&mut self, entry_id: Uuid, layer_id: Uuid) -> Result<()> {
        sqlx::query(r#"UPDATE h3_data SET "contextualLayerId" = $2 WHERE id = $1"#)
            .bind(entry_id)
            .bind(layer_id)
            .execute(&mut **self.tx()?)
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StorageError::NotInitialized("catalog transaction".into()))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
