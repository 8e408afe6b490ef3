use serde_json::{Value, json};

use crate::libs::error::{OrmError, Result};
use crate::libs::orm::Statement;
use crate::libs::schema::{TableMetadata, quote_ident};

/// Column alias carrying the aggregate of [`TableMetadata::find_number`].
pub const COUNT_ALIAS: &str = "_count_";

/// `limit ?` or `limit ?, ?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Count(u64),
    /// Offset and row count, in MySQL argument order.
    Range(u64, u64),
}

impl From<u64> for Limit {
    fn from(count: u64) -> Self {
        Limit::Count(count)
    }
}

impl From<(u64, u64)> for Limit {
    fn from((offset, count): (u64, u64)) -> Self {
        Limit::Range(offset, count)
    }
}

impl From<Limit> for Value {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Count(n) => json!(n),
            Limit::Range(offset, count) => json!([offset, count]),
        }
    }
}

impl<'a> TryFrom<&'a Value> for Limit {
    type Error = OrmError;

    /// Accepts a non-negative integer or a two element array of them.
    fn try_from(value: &'a Value) -> Result<Self> {
        let invalid = || OrmError::invalid_argument(format!("invalid limit value: {value}"));
        match value {
            Value::Number(n) => n.as_u64().map(Limit::Count).ok_or_else(invalid),
            Value::Array(items) => match items.as_slice() {
                [offset, count] => match (offset.as_u64(), count.as_u64()) {
                    (Some(offset), Some(count)) => Ok(Limit::Range(offset, count)),
                    _ => Err(invalid()),
                },
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }
}

/// Options for [`TableMetadata::find_all`].
///
/// ```
/// use minorm::FindAll;
/// use serde_json::json;
///
/// let query = FindAll::new()
///     .filter("`name` like ?", [json!("A%")])
///     .order_by("`id` desc")
///     .limit((0u64, 10u64));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FindAll {
    filter: Option<String>,
    filter_args: Vec<Value>,
    args: Vec<Value>,
    order_by: Option<String>,
    limit: Option<Value>,
}

impl FindAll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw `where` expression and the arguments for its placeholders.
    /// A later call replaces both.
    pub fn filter<I>(mut self, clause: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.filter = Some(clause.into());
        self.filter_args = args.into_iter().collect();
        self
    }

    /// Arguments for placeholders outside the filter, such as in
    /// `order_by`. They are bound after the filter's arguments and before
    /// the limit; repeated calls append.
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.args.extend(args);
        self
    }

    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order_by = Some(expr.into());
        self
    }

    pub fn limit(mut self, limit: impl Into<Limit>) -> Self {
        self.limit = Some(limit.into().into());
        self
    }

    /// Limit taken from untyped input; its shape is checked in [`FindAll::build`].
    pub fn raw_limit(mut self, limit: Value) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Assemble the statement against `meta`'s select template.
    pub fn build(&self, meta: &TableMetadata) -> Result<Statement> {
        let mut sql = vec![meta.select_template().to_string()];
        let mut args = self.filter_args.clone();
        args.extend(self.args.iter().cloned());

        if let Some(filter) = &self.filter {
            sql.push("where".into());
            sql.push(filter.clone());
        }
        if let Some(order_by) = &self.order_by {
            sql.push("order by".into());
            sql.push(order_by.clone());
        }
        if let Some(limit) = &self.limit {
            sql.push("limit".into());
            match Limit::try_from(limit)? {
                Limit::Count(n) => {
                    sql.push("?".into());
                    args.push(json!(n));
                }
                Limit::Range(offset, count) => {
                    sql.push("?, ?".into());
                    args.push(json!(offset));
                    args.push(json!(count));
                }
            }
        }
        Ok(Statement::new(sql.join(" "), args))
    }
}

/// `select_template where pk=?`.
pub fn find_by_key(meta: &TableMetadata, pk: Value) -> Statement {
    let sql = format!(
        "{} where {}=?",
        meta.select_template(),
        quote_ident(meta.column_name(meta.primary_key()))
    );
    Statement::new(sql, vec![pk])
}

/// `select <expr> as _count_ from table [where ...]`.
pub fn find_number(
    meta: &TableMetadata,
    select_expr: &str,
    filter: Option<&str>,
    args: Vec<Value>,
) -> Statement {
    let mut sql = format!(
        "select {} as {} from {}",
        select_expr,
        COUNT_ALIAS,
        quote_ident(meta.table_name())
    );
    if let Some(filter) = filter {
        sql.push_str(" where ");
        sql.push_str(filter);
    }
    Statement::new(sql, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::schema::{Field, Schema};

    fn users() -> TableMetadata {
        Schema::new("User")
            .table("users")
            .field("id", Field::integer().primary_key())
            .field("name", Field::string())
            .register()
            .unwrap()
    }

    #[test]
    fn plain_find_all_is_the_select_template() {
        let meta = users();
        let stmt = FindAll::new().build(&meta).unwrap();
        assert_eq!(stmt.sql, "select `id`, `name` from `users`");
        assert!(stmt.args.is_empty());
    }

    #[test]
    fn single_limit_adds_one_placeholder() {
        let meta = users();
        let stmt = FindAll::new().limit(5u64).build(&meta).unwrap();
        assert_eq!(stmt.sql, "select `id`, `name` from `users` limit ?");
        assert_eq!(stmt.args, vec![json!(5)]);
    }

    #[test]
    fn range_limit_adds_two_placeholders_in_order() {
        let meta = users();
        let stmt = FindAll::new()
            .filter("`name`=?", [json!("Ada")])
            .order_by("`id` desc")
            .limit((10u64, 20u64))
            .build(&meta)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "select `id`, `name` from `users` where `name`=? order by `id` desc limit ?, ?"
        );
        assert_eq!(stmt.args, vec![json!("Ada"), json!(10), json!(20)]);
    }

    #[test]
    fn separate_args_bind_between_filter_and_limit() {
        let meta = users();
        let stmt = FindAll::new()
            .filter("`name` like ?", [json!("A%")])
            .order_by("field(`id`, ?, ?)")
            .args([json!(3)])
            .args([json!(1)])
            .limit(2u64)
            .build(&meta)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "select `id`, `name` from `users` where `name` like ? order by field(`id`, ?, ?) limit ?"
        );
        assert_eq!(stmt.args, vec![json!("A%"), json!(3), json!(1), json!(2)]);
    }

    #[test]
    fn args_without_filter() {
        let meta = users();
        let stmt = FindAll::new()
            .order_by("`name` = ? desc")
            .args([json!("Ada")])
            .build(&meta)
            .unwrap();
        assert_eq!(stmt.sql, "select `id`, `name` from `users` order by `name` = ? desc");
        assert_eq!(stmt.args, vec![json!("Ada")]);

        // a second filter replaces the first one's arguments only
        let stmt = FindAll::new()
            .filter("`id`=?", [json!(1)])
            .args([json!("x")])
            .filter("`id`>?", [json!(5)])
            .build(&meta)
            .unwrap();
        assert_eq!(stmt.args, vec![json!(5), json!("x")]);
    }

    #[test]
    fn malformed_limits_are_rejected() {
        let meta = users();
        for bad in [json!("x"), json!([1, 2, 3]), json!(-1), json!([1, "2"]), json!(null)] {
            let err = FindAll::new().raw_limit(bad).build(&meta).unwrap_err();
            assert!(matches!(err, OrmError::InvalidArgument(_)));
        }
        let stmt = FindAll::new().raw_limit(json!([0, 3])).build(&meta).unwrap();
        assert_eq!(stmt.args, vec![json!(0), json!(3)]);
    }

    #[test]
    fn find_by_key_targets_primary_key_column() {
        let meta = Schema::new("User")
            .field("id", Field::integer().primary_key().name("user_id"))
            .register()
            .unwrap();
        let stmt = find_by_key(&meta, json!(1));
        assert_eq!(
            stmt.sql,
            "select `user_id` as `id` from `User` where `user_id`=?"
        );
        assert_eq!(stmt.args, vec![json!(1)]);
    }

    #[test]
    fn find_number_aliases_the_aggregate() {
        let meta = users();
        let stmt = find_number(&meta, "count(`id`)", Some("`name`=?"), vec![json!("Ada")]);
        assert_eq!(
            stmt.sql,
            "select count(`id`) as _count_ from `users` where `name`=?"
        );
        let stmt = find_number(&meta, "max(`id`)", None, vec![]);
        assert_eq!(stmt.sql, "select max(`id`) as _count_ from `users`");
    }
}
