use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use minorm::{Field, FindAll, Gateway, OrmError, Result, Row, Schema, TableMetadata};
use serde_json::{Value, json};

/// In-memory gateway: records every call and replays queued results.
#[derive(Default)]
struct RecordingGateway {
    calls: Mutex<Vec<Call>>,
    rows: Mutex<VecDeque<Vec<Row>>>,
    affected: Mutex<VecDeque<u64>>,
}

#[derive(Debug, Clone, PartialEq)]
struct Call {
    sql: String,
    args: Vec<Value>,
    size: Option<usize>,
    autocommit: Option<bool>,
}

impl RecordingGateway {
    fn with_rows(self, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                other => panic!("row must be an object, got {other}"),
            })
            .collect();
        self.rows.lock().unwrap().push_back(rows);
        self
    }

    fn with_affected(self, n: u64) -> Self {
        self.affected.lock().unwrap().push_back(n);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn select(&self, sql: &str, args: &[Value], size: Option<usize>) -> Result<Vec<Row>> {
        self.calls.lock().unwrap().push(Call {
            sql: sql.to_string(),
            args: args.to_vec(),
            size,
            autocommit: None,
        });
        let mut rows = self.rows.lock().unwrap().pop_front().unwrap_or_default();
        if let Some(n) = size.filter(|n| *n > 0) {
            rows.truncate(n);
        }
        Ok(rows)
    }

    async fn execute(&self, sql: &str, args: &[Value], autocommit: bool) -> Result<u64> {
        self.calls.lock().unwrap().push(Call {
            sql: sql.to_string(),
            args: args.to_vec(),
            size: None,
            autocommit: Some(autocommit),
        });
        Ok(self.affected.lock().unwrap().pop_front().unwrap_or(0))
    }
}

/// Gateway whose every call fails the way a driver would.
struct BrokenGateway;

#[async_trait]
impl Gateway for BrokenGateway {
    async fn select(&self, _sql: &str, _args: &[Value], _size: Option<usize>) -> Result<Vec<Row>> {
        Err(sqlx::Error::PoolClosed.into())
    }

    async fn execute(&self, _sql: &str, _args: &[Value], _autocommit: bool) -> Result<u64> {
        Err(sqlx::Error::PoolClosed.into())
    }
}

fn users() -> TableMetadata {
    Schema::new("User")
        .table("users")
        .field("id", Field::integer().primary_key())
        .field("name", Field::string())
        .register()
        .unwrap()
}

#[tokio::test]
async fn find_without_match_returns_none() {
    let meta = users();
    let gw = RecordingGateway::default();

    let found = meta.find(&gw, 1).await.unwrap();
    assert!(found.is_none());
    assert_eq!(
        gw.calls(),
        vec![Call {
            sql: "select `id`, `name` from `users` where `id`=?".into(),
            args: vec![json!(1)],
            size: Some(1),
            autocommit: None,
        }]
    );
}

#[tokio::test]
async fn find_builds_record_from_row() {
    let meta = users();
    let gw = RecordingGateway::default().with_rows(vec![json!({"id": 1, "name": "Ada"})]);

    let record = meta.find(&gw, 1).await.unwrap().unwrap();
    assert_eq!(record.get("id").unwrap(), &json!(1));
    assert_eq!(record.get("name").unwrap(), &json!("Ada"));
}

#[tokio::test]
async fn found_boolean_flags_decode_as_bool() {
    #[derive(Debug, serde::Deserialize)]
    struct Account {
        id: i64,
        admin: bool,
    }

    let meta = Schema::new("Account")
        .field("id", Field::integer().primary_key())
        .field("admin", Field::boolean())
        .register()
        .unwrap();
    // integer flag, as MySQL reports a widened BOOLEAN column
    let gw = RecordingGateway::default().with_rows(vec![json!({"id": 5, "admin": 0})]);

    let account: Account = meta.find(&gw, 5).await.unwrap().unwrap().decode().unwrap();
    assert_eq!(account.id, 5);
    assert!(!account.admin);
}

#[tokio::test]
async fn save_uses_defaults_and_tolerates_zero_rows() {
    let meta = users();
    let gw = RecordingGateway::default().with_affected(0);

    let mut user = meta.record().with("name", "Test");
    let rows = user.save(&gw).await.unwrap();

    assert_eq!(rows, 0);
    assert_eq!(
        gw.calls(),
        vec![Call {
            sql: "insert into `users` (`name`, `id`) values (?, ?)".into(),
            args: vec![json!("Test"), json!(0)],
            size: None,
            autocommit: Some(true),
        }]
    );
    // default was materialized on the record
    assert_eq!(user.get("id").unwrap(), &json!(0));
}

#[tokio::test]
async fn update_uses_current_values_only() {
    let meta = Schema::new("User")
        .table("users")
        .field("id", Field::integer().primary_key())
        .field("name", Field::string())
        .field("score", Field::float())
        .register()
        .unwrap();
    let gw = RecordingGateway::default().with_affected(1);

    let user = meta.record_with([("id", json!(4)), ("name", json!("Ada"))]);
    assert_eq!(user.update(&gw).await.unwrap(), 1);

    let call = &gw.calls()[0];
    assert_eq!(
        call.sql,
        "update `users` set `name`=?, `score`=? where `id`=?"
    );
    // `score` is unset and its default is not applied
    assert_eq!(call.args, vec![json!("Ada"), Value::Null, json!(4)]);
    assert!(!user.contains("score"));
}

#[tokio::test]
async fn update_without_non_key_columns_is_rejected() {
    let meta = Schema::new("Tag")
        .field("id", Field::string().primary_key())
        .register()
        .unwrap();
    let gw = RecordingGateway::default();

    let err = meta.record().with("id", "x").update(&gw).await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));
    assert!(gw.calls().is_empty());
}

#[tokio::test]
async fn remove_binds_primary_key() {
    let meta = users();
    let gw = RecordingGateway::default().with_affected(1);

    let user = meta.record().with("id", 9);
    assert_eq!(user.remove(&gw).await.unwrap(), 1);
    assert_eq!(gw.calls()[0].sql, "delete from `users` where `id`=?");
    assert_eq!(gw.calls()[0].args, vec![json!(9)]);
}

#[tokio::test]
async fn find_all_passes_limit_arguments() {
    let meta = users();
    let gw = RecordingGateway::default().with_rows(vec![
        json!({"id": 1, "name": "Ada"}),
        json!({"id": 2, "name": "Grace"}),
    ]);

    let records = meta
        .find_all(
            &gw,
            FindAll::new()
                .filter("`name` like ?", [json!("%a%")])
                .order_by("`id`")
                .limit((10u64, 20u64)),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[1].get("name").unwrap(), &json!("Grace"));
    let call = &gw.calls()[0];
    assert_eq!(
        call.sql,
        "select `id`, `name` from `users` where `name` like ? order by `id` limit ?, ?"
    );
    assert_eq!(call.args, vec![json!("%a%"), json!(10), json!(20)]);
    assert_eq!(call.size, None);
}

#[tokio::test]
async fn find_all_binds_order_by_arguments() {
    let meta = users();
    let gw = RecordingGateway::default();

    meta.find_all(
        &gw,
        FindAll::new()
            .order_by("`name` = ? desc")
            .args([json!("Ada")])
            .limit(3u64),
    )
    .await
    .unwrap();
    let call = &gw.calls()[0];
    assert_eq!(
        call.sql,
        "select `id`, `name` from `users` order by `name` = ? desc limit ?"
    );
    assert_eq!(call.args, vec![json!("Ada"), json!(3)]);
}

#[tokio::test]
async fn find_all_with_bad_limit_never_reaches_the_gateway() {
    let meta = users();
    let gw = RecordingGateway::default();

    let err = meta
        .find_all(&gw, FindAll::new().raw_limit(json!("x")))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));
    assert!(gw.calls().is_empty());
}

#[tokio::test]
async fn find_number_reads_the_aggregate() {
    let meta = users();
    let gw = RecordingGateway::default().with_rows(vec![json!({"_count_": 15})]);

    let count = meta
        .find_number(&gw, "count(`id`)", Some("`name`=?"), vec![json!("Ada")])
        .await
        .unwrap();
    assert_eq!(count, Some(json!(15)));
    assert_eq!(
        gw.calls()[0].sql,
        "select count(`id`) as _count_ from `users` where `name`=?"
    );
    assert_eq!(gw.calls()[0].size, Some(1));

    let empty = RecordingGateway::default();
    assert_eq!(
        meta.find_number(&empty, "count(`id`)", None, vec![]).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn engine_errors_propagate_unchanged() {
    let meta = users();

    let err = meta.find(&BrokenGateway, 1).await.unwrap_err();
    assert!(matches!(err, OrmError::Engine(sqlx::Error::PoolClosed)));

    let err = meta.record().save(&BrokenGateway).await.unwrap_err();
    assert!(matches!(err, OrmError::Engine(sqlx::Error::PoolClosed)));
}

#[tokio::test]
async fn works_through_a_trait_object() {
    let meta = users();
    let gw = RecordingGateway::default().with_affected(1);
    let dyn_gw: &dyn Gateway = &gw;

    let mut user = meta.record().with("id", 2).with("name", "Linus");
    assert_eq!(user.save(dyn_gw).await.unwrap(), 1);
    assert_eq!(gw.calls()[0].args, vec![json!("Linus"), json!(2)]);
}
