use serde_json::Value;
use tracing::{info, warn};

use crate::libs::error::{OrmError, Result};
use crate::libs::orm::{Gateway, Row};
use crate::libs::query_builder::{self, COUNT_ALIAS, FindAll};
use crate::libs::record::Record;
use crate::libs::schema::TableMetadata;

/// Read paths, operating on the registered table.
impl TableMetadata {
    /// Empty record for this table.
    pub fn record(&self) -> Record<'_> {
        Record::new(self)
    }

    /// Record pre-filled with `values`.
    pub fn record_with<I, K, V>(&self, values: I) -> Record<'_>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let row: Row = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Record::from_row(self, row)
    }

    /// Look a record up by primary key.
    pub async fn find<G>(&self, gateway: &G, pk: impl Into<Value>) -> Result<Option<Record<'_>>>
    where
        G: Gateway + ?Sized,
    {
        let stmt = query_builder::find_by_key(self, pk.into());
        let rows = gateway.select(&stmt.sql, &stmt.args, Some(1)).await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| Record::from_row(self, row)))
    }

    /// Every record matching `query`, in the order the engine returns them.
    ///
    /// # Example
    /// ```no_run
    /// # async fn demo(pool: &minorm::OrmPool, users: &minorm::TableMetadata) -> minorm::Result<()> {
    /// use minorm::FindAll;
    /// use serde_json::json;
    ///
    /// let admins = users
    ///     .find_all(pool, FindAll::new().filter("`admin`=?", [json!(true)]).limit(10u64))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn find_all<G>(&self, gateway: &G, query: FindAll) -> Result<Vec<Record<'_>>>
    where
        G: Gateway + ?Sized,
    {
        let stmt = query.build(self)?;
        let rows = gateway.select(&stmt.sql, &stmt.args, None).await?;
        Ok(rows
            .into_iter()
            .map(|row| Record::from_row(self, row))
            .collect())
    }

    /// Single aggregate such as `count(id)`; `None` when no row comes back.
    pub async fn find_number<G>(
        &self,
        gateway: &G,
        select_expr: &str,
        filter: Option<&str>,
        args: Vec<Value>,
    ) -> Result<Option<Value>>
    where
        G: Gateway + ?Sized,
    {
        let stmt = query_builder::find_number(self, select_expr, filter, args);
        let rows = gateway.select(&stmt.sql, &stmt.args, Some(1)).await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|mut row| row.remove(COUNT_ALIAS).unwrap_or(Value::Null)))
    }
}

/// Write paths. A write touching no row is logged, not raised; the affected
/// row count is returned so callers can tell.
impl Record<'_> {
    /// Insert this record, materializing defaults for unset fields.
    pub async fn save<G>(&mut self, gateway: &G) -> Result<u64>
    where
        G: Gateway + ?Sized,
    {
        let meta = self.meta();
        let mut args: Vec<Value> = meta
            .non_key_fields()
            .iter()
            .map(|f| self.get_value_or_default(f))
            .collect();
        args.push(self.get_value_or_default(meta.primary_key()));

        let rows = gateway.execute(meta.insert_template(), &args, true).await?;
        report("insert", meta, rows);
        Ok(rows)
    }

    /// Update the row with this record's primary key. Unset fields are
    /// written as `NULL`; defaults are not applied.
    pub async fn update<G>(&self, gateway: &G) -> Result<u64>
    where
        G: Gateway + ?Sized,
    {
        let meta = self.meta();
        let template = meta.update_template().ok_or_else(|| {
            OrmError::invalid_argument(format!(
                "table `{}` has no columns besides its primary key",
                meta.table_name()
            ))
        })?;
        let mut args: Vec<Value> = meta
            .non_key_fields()
            .iter()
            .map(|f| self.get_value(f))
            .collect();
        args.push(self.get_value(meta.primary_key()));

        let rows = gateway.execute(template, &args, true).await?;
        report("update", meta, rows);
        Ok(rows)
    }

    /// Delete the row with this record's primary key.
    pub async fn remove<G>(&self, gateway: &G) -> Result<u64>
    where
        G: Gateway + ?Sized,
    {
        let meta = self.meta();
        let args = [self.get_value(meta.primary_key())];
        let rows = gateway.execute(meta.delete_template(), &args, true).await?;
        report("delete", meta, rows);
        Ok(rows)
    }
}

fn report(action: &str, meta: &TableMetadata, rows: u64) {
    if rows == 0 {
        warn!(action, table = meta.table_name(), rows, "failed to {action} by primary key");
    } else {
        info!(action, table = meta.table_name(), rows, "{action} by primary key succeeded");
    }
}
