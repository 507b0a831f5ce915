//! The Public Contract Layer (spec §4.8): the single facade external callers
//! (an eventual HTTP binding, or this crate's own tests) drive the store
//! through.
//!
//! Owns the [`TableCatalog`], one [`ShardStore`] per shard, the
//! [`TransactionCoordinator`] and the [`IdempotencyCache`] — the "global
//! mutable state" spec §9 assigns a single clearly-scoped owner.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::core::catalog::{KeyAttribute, TableCatalog, TableSchema};
use crate::core::common::error::StoreError;
use crate::core::common::key::{RowKey, SortableKey};
use crate::core::common::value::{AttributeValue, Item};
use crate::core::config::Config;
use crate::core::expression::{Condition, UpdateExpression};
use crate::core::idempotency::{CachedOutcome, IdempotencyCache};
use crate::core::router;
use crate::core::storage::shard::ShardStore;
use crate::core::transaction::{OpKind, ResolvedOp, RetryPolicy, TransactionCoordinator};

pub use crate::core::catalog::TableSchema as TableDescription;

/// A sort-key range predicate for `Query` (spec §4.2).
#[derive(Debug, Clone)]
pub enum SortKeyCondition {
    Eq(AttributeValue),
    Lt(AttributeValue),
    Le(AttributeValue),
    Gt(AttributeValue),
    Ge(AttributeValue),
    Between(AttributeValue, AttributeValue),
    BeginsWith(AttributeValue),
}

/// One page of a `Query` result.
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

/// What a `TransactWriteItems` op does to its target row.
#[derive(Debug, Clone)]
pub enum WriteKind {
    Put(Item),
    Update(UpdateExpression),
    Delete,
    ConditionCheck,
}

/// One op in a `TransactWriteItems` call. `key` carries the primary key
/// attributes for `Update`/`Delete`/`ConditionCheck`; for `Put` the key is
/// read out of the item itself and `key` may be left empty.
#[derive(Debug, Clone)]
pub struct WriteOp {
    pub table: String,
    pub key: Item,
    pub kind: WriteKind,
    pub condition: Option<Condition>,
    pub return_old_on_condition_check_failure: bool,
}

pub struct Store {
    catalog: TableCatalog,
    coordinator: TransactionCoordinator,
    idempotency: IdempotencyCache,
    retry: RetryPolicy,
    shard_count: u32,
    // Serializes DeleteTable against CreateTable/other DeleteTable calls so
    // catalog removal and cross-shard row cleanup happen as one step from
    // the caller's perspective; ordinary item operations never take it.
    ddl_lock: Mutex<()>,
}

fn route(pk: &AttributeValue, shard_count: u32) -> u32 {
    let serialized = serde_json::to_string(pk).unwrap_or_default();
    router::shard_of(&serialized, shard_count)
}

impl Store {
    /// Opens (creating if necessary) the data directory, catalog, and every
    /// shard named by `config`.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the data directory or any shard file
    /// cannot be created or read.
    pub fn open(config: Config) -> Result<Self, StoreError> {
        std::fs::create_dir_all(config.data_dir_path())?;
        let catalog = TableCatalog::open(config.catalog_path())?;
        let shards = (0..config.shard_count)
            .map(|i| ShardStore::open(config.shard_path(i), config.lock_lease()))
            .collect::<Result<Vec<_>, _>>()?;
        let coordinator = TransactionCoordinator::new(
            shards,
            config.lock_retry_base(),
            config.lock_retry_cap(),
            config.lock_retry_budget(),
        );
        let idempotency = IdempotencyCache::new(config.idempotency_ttl());
        let retry = RetryPolicy {
            base: config.lock_retry_base(),
            cap: config.lock_retry_cap(),
            budget: config.lock_retry_budget(),
        };
        Ok(Self {
            catalog,
            coordinator,
            idempotency,
            retry,
            shard_count: config.shard_count,
            ddl_lock: Mutex::new(()),
        })
    }

    fn schema_for(&self, table: &str) -> Result<TableSchema, StoreError> {
        self.catalog
            .describe_table(table)
            .ok_or_else(|| StoreError::ResourceNotFound(format!("table {table} not found")))
    }

    fn key_value<'a>(source: &'a Item, attr: &KeyAttribute, label: &str) -> Result<&'a AttributeValue, StoreError> {
        let value = source
            .get(&attr.name)
            .ok_or_else(|| StoreError::Validation(format!("missing {label} attribute '{}'", attr.name)))?;
        if !value.matches_scalar(attr.scalar_type) {
            return Err(StoreError::Validation(format!(
                "{label} attribute '{}' has the wrong scalar type",
                attr.name
            )));
        }
        Ok(value)
    }

    fn resolve_row_key(&self, schema: &TableSchema, source: &Item) -> Result<(u32, RowKey), StoreError> {
        let pk_value = Self::key_value(source, &schema.partition_key, "partition key")?;
        let pk = SortableKey::encode(pk_value, schema.partition_key.scalar_type)
            .ok_or_else(|| StoreError::Validation("partition key encoding failed".into()))?;
        let sk = match &schema.sort_key {
            Some(attr) => {
                let sk_value = Self::key_value(source, attr, "sort key")?;
                Some(
                    SortableKey::encode(sk_value, attr.scalar_type)
                        .ok_or_else(|| StoreError::Validation("sort key encoding failed".into()))?,
                )
            }
            None => None,
        };
        let shard_id = route(pk_value, self.shard_count);
        Ok((shard_id, RowKey::new(schema.table_name.clone(), pk, sk)))
    }

    // --- Table management -------------------------------------------------

    /// `CreateTable`.
    ///
    /// # Errors
    /// Returns [`StoreError::ResourceInUse`] if the name already exists.
    pub fn create_table(
        &self,
        name: &str,
        partition_key: KeyAttribute,
        sort_key: Option<KeyAttribute>,
        created_at: String,
    ) -> Result<TableDescription, StoreError> {
        let _guard = self.ddl_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let schema = TableSchema { table_name: name.to_string(), partition_key, sort_key, created_at };
        self.catalog.create_table(schema.clone())?;
        tracing::info!(table = name, "table created");
        Ok(schema)
    }

    /// `DeleteTable`: removes the catalog entry and every row of that table
    /// across all shards.
    ///
    /// # Errors
    /// Returns [`StoreError::ResourceNotFound`] if the table does not exist.
    pub fn delete_table(&self, name: &str) -> Result<TableDescription, StoreError> {
        let _guard = self.ddl_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let schema = self.catalog.delete_table(name)?;
        for shard_id in 0..self.shard_count {
            self.coordinator.shard(shard_id).delete_table_rows(name)?;
        }
        tracing::info!(table = name, "table deleted");
        Ok(schema)
    }

    #[must_use]
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog.list_tables()
    }

    /// `DescribeTable`.
    ///
    /// # Errors
    /// Returns [`StoreError::ResourceNotFound`] if the table does not exist.
    pub fn describe_table(&self, name: &str) -> Result<TableDescription, StoreError> {
        self.schema_for(name)
    }

    // --- Single-item operations --------------------------------------------

    /// `PutItem`. Routed straight to the target shard's lock-evaluate-commit
    /// path; does not go through the 2PC coordinator (spec §4.8).
    ///
    /// # Errors
    /// Returns [`StoreError::ConditionalCheckFailed`] if `condition` is
    /// false, or [`StoreError::TransactionConflict`] if the row's lock
    /// cannot be acquired within the contention budget.
    pub fn put_item(&self, table: &str, item: Item, condition: Option<&Condition>) -> Result<(), StoreError> {
        let schema = self.schema_for(table)?;
        let (shard_id, row_key) = self.resolve_row_key(&schema, &item)?;
        self.coordinator.shard(shard_id).put(row_key, item, condition, self.retry)
    }

    /// `GetItem`. `projection` restricts the returned attributes to the
    /// given names; `None` returns the full item.
    ///
    /// # Errors
    /// Returns [`StoreError::ResourceNotFound`] if the table does not exist.
    pub fn get_item(
        &self,
        table: &str,
        key: &Item,
        projection: Option<&[String]>,
    ) -> Result<Option<Item>, StoreError> {
        let schema = self.schema_for(table)?;
        let (shard_id, row_key) = self.resolve_row_key(&schema, key)?;
        let item = self.coordinator.shard(shard_id).read_committed(&row_key)?;
        Ok(item.map(|item| match projection {
            Some(names) => item.into_iter().filter(|(k, _)| names.iter().any(|n| n == k)).collect(),
            None => item,
        }))
    }

    /// `DeleteItem`.
    ///
    /// # Errors
    /// Same as [`Store::put_item`].
    pub fn delete_item(&self, table: &str, key: &Item, condition: Option<&Condition>) -> Result<(), StoreError> {
        let schema = self.schema_for(table)?;
        let (shard_id, row_key) = self.resolve_row_key(&schema, key)?;
        self.coordinator.shard(shard_id).delete(row_key, condition, self.retry)
    }

    /// `UpdateItem`; returns the new item image.
    ///
    /// # Errors
    /// Same as [`Store::put_item`].
    pub fn update_item(
        &self,
        table: &str,
        key: &Item,
        update: &UpdateExpression,
        condition: Option<&Condition>,
    ) -> Result<Item, StoreError> {
        let schema = self.schema_for(table)?;
        let (shard_id, row_key) = self.resolve_row_key(&schema, key)?;
        self.coordinator.shard(shard_id).update(row_key, update, condition, self.retry)
    }

    /// `Query`: a partition-key-scoped, sort-key-ordered range scan (spec
    /// §4.2).
    ///
    /// # Errors
    /// Returns [`StoreError::ResourceNotFound`] if the table does not exist,
    /// or [`StoreError::Validation`] if `sk_condition` is given for a table
    /// with no sort key.
    pub fn query(
        &self,
        table: &str,
        pk_value: &AttributeValue,
        sk_condition: Option<&SortKeyCondition>,
        forward: bool,
        limit: Option<usize>,
        exclusive_start_key: Option<&Item>,
    ) -> Result<QueryPage, StoreError> {
        let schema = self.schema_for(table)?;
        if !pk_value.matches_scalar(schema.partition_key.scalar_type) {
            return Err(StoreError::Validation("partition key value has the wrong scalar type".into()));
        }
        let pk = SortableKey::encode(pk_value, schema.partition_key.scalar_type)
            .ok_or_else(|| StoreError::Validation("partition key encoding failed".into()))?;

        let sort_attr = match (&schema.sort_key, sk_condition) {
            (Some(attr), _) => Some(attr.clone()),
            (None, Some(_)) => {
                return Err(StoreError::Validation("table has no sort key to filter on".into()))
            }
            (None, None) => None,
        };

        let bounds = sk_condition
            .map(|cond| encode_sort_condition(cond, sort_attr.as_ref()))
            .transpose()?;

        let exclusive_start_sk = exclusive_start_key
            .and_then(|item| sort_attr.as_ref().map(|attr| (attr, item)))
            .map(|(attr, item)| {
                let value = Self::key_value(item, attr, "sort key")?;
                SortableKey::encode(value, attr.scalar_type)
                    .ok_or_else(|| StoreError::Validation("sort key encoding failed".into()))
            })
            .transpose()?;

        let shard_id = route(pk_value, self.shard_count);
        let page = self.coordinator.shard(shard_id).query(
            table,
            &pk,
            |sk| bounds.as_ref().map_or(true, |b| b.contains(sk)),
            forward,
            limit,
            exclusive_start_sk.as_ref(),
        );

        let last_evaluated_key = if page.last_evaluated_sk.is_some() {
            page.items.last().map(|item| {
                let mut key = Item::new();
                if let Some(v) = item.get(&schema.partition_key.name) {
                    key.insert(schema.partition_key.name.clone(), v.clone());
                }
                if let Some(attr) = &schema.sort_key {
                    if let Some(v) = item.get(&attr.name) {
                        key.insert(attr.name.clone(), v.clone());
                    }
                }
                key
            })
        } else {
            None
        };

        Ok(QueryPage { items: page.items, last_evaluated_key })
    }

    // --- Transactions --------------------------------------------------

    fn resolve_write_op(&self, op: &WriteOp) -> Result<ResolvedOp, StoreError> {
        let schema = self.schema_for(&op.table)?;
        let source = match &op.kind {
            WriteKind::Put(item) => item,
            WriteKind::Update(_) | WriteKind::Delete | WriteKind::ConditionCheck => &op.key,
        };
        let (shard_id, row_key) = self.resolve_row_key(&schema, source)?;
        let kind = match &op.kind {
            WriteKind::Put(item) => OpKind::Put(item.clone()),
            WriteKind::Update(update) => OpKind::Update(update.clone()),
            WriteKind::Delete => OpKind::Delete,
            WriteKind::ConditionCheck => OpKind::ConditionCheck,
        };
        Ok(ResolvedOp {
            shard_id,
            row_key,
            kind,
            condition: op.condition.clone(),
            return_old_on_condition_failure: op.return_old_on_condition_check_failure,
        })
    }

    /// `TransactWriteItems`.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] or [`StoreError::ResourceNotFound`]
    /// synchronously if the request is malformed (spec §4.5 preconditions),
    /// or [`StoreError::TransactionCanceled`] if the transaction aborted.
    pub fn transact_write_items(
        &self,
        ops: Vec<WriteOp>,
        client_request_token: Option<&str>,
    ) -> Result<(), StoreError> {
        if let Some(token) = client_request_token {
            match self.idempotency.get(token) {
                Some(CachedOutcome::Committed(_)) => return Ok(()),
                Some(CachedOutcome::Canceled(reasons)) => {
                    return Err(StoreError::TransactionCanceled(reasons));
                }
                None => {}
            }
        }

        if ops.is_empty() || ops.len() > 100 {
            return Err(StoreError::Validation(
                "a transaction must contain between 1 and 100 operations".into(),
            ));
        }

        let resolved: Vec<ResolvedOp> =
            ops.iter().map(|op| self.resolve_write_op(op)).collect::<Result<_, _>>()?;

        let mut seen = HashSet::new();
        for op in &resolved {
            if !seen.insert(&op.row_key) {
                return Err(StoreError::Validation("duplicate primary key within one transaction".into()));
            }
        }

        tracing::info!(op_count = resolved.len(), "transact_write_items starting");
        match self.coordinator.transact_write(resolved) {
            Ok(images) => {
                if let Some(token) = client_request_token {
                    self.idempotency.put(token.to_string(), CachedOutcome::Committed(images));
                }
                Ok(())
            }
            Err(reasons) => {
                if let Some(token) = client_request_token {
                    self.idempotency.put(token.to_string(), CachedOutcome::Canceled(reasons.clone()));
                }
                Err(StoreError::TransactionCanceled(reasons))
            }
        }
    }

    /// `TransactGetItems`.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] if `keys` is empty or exceeds 100
    /// entries, or [`StoreError::ResourceNotFound`] if a referenced table
    /// does not exist.
    pub fn transact_get_items(&self, keys: Vec<(String, Item)>) -> Result<Vec<Option<Item>>, StoreError> {
        let resolved: Vec<(u32, RowKey)> = keys
            .iter()
            .map(|(table, key)| {
                let schema = self.schema_for(table)?;
                self.resolve_row_key(&schema, key)
            })
            .collect::<Result<_, _>>()?;
        self.coordinator.transact_get(&resolved)
    }
}

struct SortBounds {
    lower: Option<SortableKey>,
    upper: Option<SortableKey>,
    prefix: Option<SortableKey>,
    exact: Option<SortableKey>,
}

impl SortBounds {
    fn contains(&self, sk: Option<&SortableKey>) -> bool {
        let Some(sk) = sk else { return false };
        if let Some(exact) = &self.exact {
            return sk == exact;
        }
        if let Some(prefix) = &self.prefix {
            return sk.as_bytes().starts_with(prefix.as_bytes());
        }
        self.lower.as_ref().map_or(true, |lo| sk >= lo) && self.upper.as_ref().map_or(true, |hi| sk <= hi)
    }
}

fn encode_sort_condition(
    condition: &SortKeyCondition,
    sort_attr: Option<&KeyAttribute>,
) -> Result<SortBounds, StoreError> {
    let attr = sort_attr.ok_or_else(|| StoreError::Validation("table has no sort key to filter on".into()))?;
    let encode = |v: &AttributeValue| {
        SortableKey::encode(v, attr.scalar_type)
            .ok_or_else(|| StoreError::Validation("sort key condition value has the wrong scalar type".into()))
    };
    Ok(match condition {
        SortKeyCondition::Eq(v) => SortBounds { lower: None, upper: None, prefix: None, exact: Some(encode(v)?) },
        SortKeyCondition::Lt(v) => {
            let v = encode(v)?;
            SortBounds { lower: None, upper: Some(v), prefix: None, exact: None }
        }
        SortKeyCondition::Le(v) => SortBounds { lower: None, upper: Some(encode(v)?), prefix: None, exact: None },
        SortKeyCondition::Gt(v) => SortBounds { lower: Some(encode(v)?), upper: None, prefix: None, exact: None },
        SortKeyCondition::Ge(v) => SortBounds { lower: Some(encode(v)?), upper: None, prefix: None, exact: None },
        SortKeyCondition::Between(lo, hi) => {
            SortBounds { lower: Some(encode(lo)?), upper: Some(encode(hi)?), prefix: None, exact: None }
        }
        SortKeyCondition::BeginsWith(v) => {
            SortBounds { lower: None, upper: None, prefix: Some(encode(v)?), exact: None }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::value::ScalarType;
    use crate::core::expression::{field, SetOperand};
    use tempfile::tempdir;

    fn open_store(dir: &std::path::Path) -> Store {
        let config = Config { shard_count: 2, data_dir: dir.to_string_lossy().into_owned(), ..Config::default() };
        Store::open(config).unwrap()
    }

    fn key_item(pk: &str) -> Item {
        let mut item = Item::new();
        item.insert("id".into(), AttributeValue::S(pk.into()));
        item
    }

    #[test]
    fn create_table_then_put_and_get_item() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .create_table(
                "widgets",
                KeyAttribute { name: "id".into(), scalar_type: ScalarType::String },
                None,
                "2026-01-01T00:00:00Z".into(),
            )
            .unwrap();

        let mut item = key_item("w1");
        item.insert("label".into(), AttributeValue::S("first".into()));
        store.put_item("widgets", item.clone(), None).unwrap();

        let fetched = store.get_item("widgets", &key_item("w1"), None).unwrap().unwrap();
        assert_eq!(fetched, item);
        assert!(store.get_item("widgets", &key_item("missing"), None).unwrap().is_none());
    }

    #[test]
    fn put_with_failing_condition_is_conditional_check_failed() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .create_table(
                "widgets",
                KeyAttribute { name: "id".into(), scalar_type: ScalarType::String },
                None,
                "2026-01-01T00:00:00Z".into(),
            )
            .unwrap();
        store.put_item("widgets", key_item("w1"), None).unwrap();

        let condition = Condition::AttributeNotExists(field("id"));
        let err = store.put_item("widgets", key_item("w1"), Some(&condition)).unwrap_err();
        assert!(matches!(err, StoreError::ConditionalCheckFailed(_)));
    }

    #[test]
    fn update_item_applies_expression_and_returns_new_image() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .create_table(
                "accounts",
                KeyAttribute { name: "id".into(), scalar_type: ScalarType::String },
                None,
                "2026-01-01T00:00:00Z".into(),
            )
            .unwrap();
        let mut item = key_item("a1");
        item.insert("balance".into(), AttributeValue::N("10".into()));
        store.put_item("accounts", item, None).unwrap();

        let update =
            UpdateExpression::new(vec![(field("balance"), SetOperand::Plus(field("balance"), AttributeValue::N("5".into())))], vec![], vec![], vec![])
                .unwrap();
        let new_image = store.update_item("accounts", &key_item("a1"), &update, None).unwrap();
        assert_eq!(new_image.get("balance"), Some(&AttributeValue::N("15".into())));
    }

    #[test]
    fn delete_table_removes_rows_across_shards() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .create_table(
                "widgets",
                KeyAttribute { name: "id".into(), scalar_type: ScalarType::String },
                None,
                "2026-01-01T00:00:00Z".into(),
            )
            .unwrap();
        for i in 0..10 {
            store.put_item("widgets", key_item(&format!("w{i}")), None).unwrap();
        }
        store.delete_table("widgets").unwrap();
        assert!(store.describe_table("widgets").is_err());
    }

    #[test]
    fn query_orders_by_sort_key_and_paginates() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .create_table(
                "events",
                KeyAttribute { name: "userId".into(), scalar_type: ScalarType::String },
                Some(KeyAttribute { name: "timestamp".into(), scalar_type: ScalarType::Number }),
                "2026-01-01T00:00:00Z".into(),
            )
            .unwrap();
        for ts in [100, 200, 300, 400, 500] {
            let mut item = Item::new();
            item.insert("userId".into(), AttributeValue::S("user1".into()));
            item.insert("timestamp".into(), AttributeValue::N(ts.to_string()));
            store.put_item("events", item, None).unwrap();
        }

        let page = store
            .query(
                "events",
                &AttributeValue::S("user1".into()),
                Some(&SortKeyCondition::Between(
                    AttributeValue::N("200".into()),
                    AttributeValue::N("400".into()),
                )),
                true,
                None,
                None,
            )
            .unwrap();
        let timestamps: Vec<String> =
            page.items.iter().map(|i| match i.get("timestamp").unwrap() {
                AttributeValue::N(n) => n.clone(),
                _ => unreachable!(),
            }).collect();
        assert_eq!(timestamps, vec!["200", "300", "400"]);

        let descending = store
            .query(
                "events",
                &AttributeValue::S("user1".into()),
                Some(&SortKeyCondition::Between(
                    AttributeValue::N("200".into()),
                    AttributeValue::N("400".into()),
                )),
                false,
                None,
                None,
            )
            .unwrap();
        let timestamps: Vec<String> =
            descending.items.iter().map(|i| match i.get("timestamp").unwrap() {
                AttributeValue::N(n) => n.clone(),
                _ => unreachable!(),
            }).collect();
        assert_eq!(timestamps, vec!["400", "300", "200"]);
    }

    #[test]
    fn transact_write_items_is_idempotent_on_retried_token() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .create_table(
                "widgets",
                KeyAttribute { name: "id".into(), scalar_type: ScalarType::String },
                None,
                "2026-01-01T00:00:00Z".into(),
            )
            .unwrap();

        let mut first = key_item("x");
        first.insert("value".into(), AttributeValue::S("first".into()));
        let op = WriteOp {
            table: "widgets".into(),
            key: Item::new(),
            kind: WriteKind::Put(first),
            condition: None,
            return_old_on_condition_check_failure: false,
        };
        store.transact_write_items(vec![op], Some("token-1")).unwrap();

        let mut modified = key_item("x");
        modified.insert("value".into(), AttributeValue::S("modified".into()));
        store.put_item("widgets", modified, None).unwrap();

        let mut replay = key_item("x");
        replay.insert("value".into(), AttributeValue::S("first".into()));
        let replay_op = WriteOp {
            table: "widgets".into(),
            key: Item::new(),
            kind: WriteKind::Put(replay),
            condition: None,
            return_old_on_condition_check_failure: false,
        };
        store.transact_write_items(vec![replay_op], Some("token-1")).unwrap();

        let current = store.get_item("widgets", &key_item("x"), None).unwrap().unwrap();
        assert_eq!(current.get("value"), Some(&AttributeValue::S("modified".into())));
    }
}
