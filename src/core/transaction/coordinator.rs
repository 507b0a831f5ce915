//! Drives the cross-shard two-phase-commit state machine (spec §4.5).
//!
//! `std::thread::scope` fans lock acquisition and staging out across the
//! participating shards from the calling thread, the same pattern the host
//! codebase's `core::connection::pool` uses for bounded worker concurrency,
//! adapted here so results can be gathered without `unsafe` lifetime games.

use std::collections::BTreeSet;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::common::error::StoreError;
use crate::core::common::key::RowKey;
use crate::core::common::value::Item;
use crate::core::expression::evaluator::{apply_update, evaluate_condition};
use crate::core::expression::{Condition, UpdateExpression};
use crate::core::storage::shard::{ShardStore, StagedOp};
use crate::core::transaction::lock::Intent;
use crate::core::transaction::next_txid;

/// Why one op in a canceled transaction did not commit.
#[derive(Debug, Clone, PartialEq)]
pub enum CancellationReason {
    None,
    ConditionalCheckFailed { item: Option<Item> },
    TransactionConflict,
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub enum OpKind {
    Put(Item),
    Update(UpdateExpression),
    Delete,
    ConditionCheck,
}

/// One already-routed operation in a `TransactWriteItems` call: the caller
/// (the `Store` facade) has already resolved the table's key schema and
/// computed the shard and [`RowKey`].
#[derive(Debug, Clone)]
pub struct ResolvedOp {
    pub shard_id: u32,
    pub row_key: RowKey,
    pub kind: OpKind,
    pub condition: Option<Condition>,
    pub return_old_on_condition_failure: bool,
}

pub struct TransactionCoordinator {
    shards: Vec<ShardStore>,
    retry_base: Duration,
    retry_cap: Duration,
    retry_budget: Duration,
}

impl TransactionCoordinator {
    #[must_use]
    pub fn new(
        shards: Vec<ShardStore>,
        retry_base: Duration,
        retry_cap: Duration,
        retry_budget: Duration,
    ) -> Self {
        Self { shards, retry_base, retry_cap, retry_budget }
    }

    #[must_use]
    pub fn shard(&self, id: u32) -> &ShardStore {
        &self.shards[id as usize]
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Executes `ops` as one atomic transaction.
    ///
    /// On success, returns the resulting item image for each op in input
    /// order (`Some` for `Put`/`Update`, `None` for `Delete`/`ConditionCheck`).
    ///
    /// # Errors
    /// Returns `CancellationReason`s aligned 1:1 with `ops` if any
    /// condition failed, lock acquisition could not complete within the
    /// retry budget, or validation failed.
    pub fn transact_write(&self, ops: Vec<ResolvedOp>) -> Result<Vec<Option<Item>>, Vec<CancellationReason>> {
        if ops.is_empty() || ops.len() > 100 {
            return Err(vec![
                CancellationReason::ValidationError(
                    "a transaction must contain between 1 and 100 operations".into()
                );
                ops.len().max(1)
            ]);
        }
        {
            let mut seen = std::collections::HashSet::new();
            for op in &ops {
                if !seen.insert(&op.row_key) {
                    return Err(ops
                        .iter()
                        .map(|_| {
                            CancellationReason::ValidationError(
                                "duplicate primary key within one transaction".into(),
                            )
                        })
                        .collect());
                }
            }
        }

        let txid = next_txid();

        // Canonical acquisition order: ascending (shard_id, row_key) — spec
        // §4.4's deadlock-prevention rule.
        let mut order: Vec<usize> = (0..ops.len()).collect();
        order.sort_by(|&a, &b| (ops[a].shard_id, &ops[a].row_key).cmp(&(ops[b].shard_id, &ops[b].row_key)));

        let deadline = Instant::now() + self.retry_budget;
        let mut backoff = self.retry_base;
        let acquired_for: Vec<usize>;
        loop {
            match self.try_acquire_all(txid, &ops, &order) {
                Ok(()) => {
                    acquired_for = order.clone();
                    break;
                }
                Err(failed_index) => {
                    self.release_acquired(txid, &ops, &order);
                    if Instant::now() >= deadline {
                        let mut reasons = vec![CancellationReason::None; ops.len()];
                        reasons[failed_index] = CancellationReason::TransactionConflict;
                        return Err(reasons);
                    }
                    thread::sleep(backoff.min(self.retry_cap));
                    backoff = (backoff * 2).min(self.retry_cap);
                }
            }
        }
        let _ = acquired_for;

        // Phase 1b: evaluate conditions and compute staged images.
        let mut conditions_ok = vec![true; ops.len()];
        let mut current_images: Vec<Option<Item>> = vec![None; ops.len()];
        let mut new_images: Vec<Option<Item>> = vec![None; ops.len()];

        for &i in &order {
            let op = &ops[i];
            let shard = self.shard(op.shard_id);
            let current = match shard.read_committed(&op.row_key) {
                Ok(current) => current,
                Err(_) => {
                    self.abort_all(txid, &ops, &order);
                    let mut reasons = vec![CancellationReason::None; ops.len()];
                    reasons[i] = CancellationReason::ValidationError("internal read failure".into());
                    return Err(reasons);
                }
            };
            let basis = current.clone().unwrap_or_default();
            let ok = op.condition.as_ref().map_or(true, |cond| evaluate_condition(cond, &basis));
            conditions_ok[i] = ok;
            current_images[i] = current.clone();
            if ok {
                new_images[i] = match &op.kind {
                    OpKind::Put(item) => Some(item.clone()),
                    OpKind::Update(update) => Some(apply_update(update, &basis)),
                    OpKind::Delete | OpKind::ConditionCheck => None,
                };
            }
        }

        if conditions_ok.iter().any(|ok| !ok) {
            self.abort_all(txid, &ops, &order);
            let reasons = conditions_ok
                .iter()
                .zip(ops.iter())
                .zip(current_images.iter())
                .map(|((ok, op), current)| {
                    if *ok {
                        CancellationReason::None
                    } else {
                        let item = if op.return_old_on_condition_failure { current.clone() } else { None };
                        CancellationReason::ConditionalCheckFailed { item }
                    }
                })
                .collect();
            return Err(reasons);
        }

        for &i in &order {
            let op = &ops[i];
            match &op.kind {
                OpKind::Put(_) | OpKind::Update(_) => {
                    let image = new_images[i].clone().unwrap_or_default();
                    self.shard(op.shard_id).stage_write(txid, op.row_key.clone(), StagedOp::Put(image));
                }
                OpKind::Delete => {
                    self.shard(op.shard_id).stage_write(txid, op.row_key.clone(), StagedOp::Delete);
                }
                OpKind::ConditionCheck => {}
            }
        }

        // Phase 2: commit, one shard at a time (each shard applies its own
        // staged writes transactionally against its local store).
        let mut shard_ids: Vec<u32> = ops.iter().map(|op| op.shard_id).collect();
        shard_ids.sort_unstable();
        shard_ids.dedup();
        for shard_id in shard_ids {
            if let Err(err) = self.shard(shard_id).commit(txid) {
                tracing::error!(shard_id, %err, "shard commit failed after staging");
            }
        }

        Ok(new_images)
    }

    /// `TransactGetItems`: committed reads grouped by shard, returned aligned
    /// with the input.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] if `row_keys` is empty or exceeds
    /// 100 entries.
    pub fn transact_get(
        &self,
        row_keys: &[(u32, RowKey)],
    ) -> Result<Vec<Option<Item>>, StoreError> {
        if row_keys.is_empty() || row_keys.len() > 100 {
            return Err(StoreError::Validation(
                "a TransactGetItems call must contain between 1 and 100 keys".into(),
            ));
        }
        row_keys.iter().map(|(shard_id, key)| self.shard(*shard_id).read_committed(key)).collect()
    }

    fn try_acquire_all(&self, txid: u64, ops: &[ResolvedOp], order: &[usize]) -> Result<(), usize> {
        for &i in order {
            let op = &ops[i];
            if self.shard(op.shard_id).acquire_lock(txid, &op.row_key, Intent::Write).is_err() {
                return Err(i);
            }
        }
        Ok(())
    }

    fn release_acquired(&self, txid: u64, ops: &[ResolvedOp], order: &[usize]) {
        let shard_ids: BTreeSet<u32> = order.iter().map(|&i| ops[i].shard_id).collect();
        for shard_id in shard_ids {
            self.shard(shard_id).release_locks(txid);
        }
    }

    fn abort_all(&self, txid: u64, ops: &[ResolvedOp], order: &[usize]) {
        let shard_ids: BTreeSet<u32> = order.iter().map(|&i| ops[i].shard_id).collect();
        for shard_id in shard_ids {
            self.shard(shard_id).abort(txid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::value::{AttributeValue, ScalarType};
    use crate::core::common::key::SortableKey;
    use crate::core::expression::{field, CompareOp, Operand, SetOperand};
    use tempfile::tempdir;

    fn coordinator(dir: &std::path::Path, shard_count: u32) -> TransactionCoordinator {
        let shards = (0..shard_count)
            .map(|i| ShardStore::open(dir.join(format!("shard-{i}.db")), Duration::from_secs(30)).unwrap())
            .collect();
        TransactionCoordinator::new(
            shards,
            Duration::from_millis(5),
            Duration::from_millis(50),
            Duration::from_millis(200),
        )
    }

    fn row(table: &str, pk: &str, shard_count: u32) -> (u32, RowKey) {
        let key = SortableKey::encode(&AttributeValue::S(pk.into()), ScalarType::String).unwrap();
        let shard_id = crate::core::router::shard_of(pk, shard_count);
        (shard_id, RowKey::new(table, key, None))
    }

    fn balance_item(id: &str, balance: &str) -> Item {
        let mut item = Item::new();
        item.insert("id".into(), AttributeValue::S(id.into()));
        item.insert("balance".into(), AttributeValue::N(balance.into()));
        item
    }

    #[test]
    fn atomic_transfer_succeeds_when_funds_available() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator(dir.path(), 4);
        let (shard_a, key_a) = row("accounts", "A", 4);
        let (shard_b, key_b) = row("accounts", "B", 4);
        coordinator.shard(shard_a).stage_write(0, key_a.clone(), StagedOp::Put(balance_item("A", "1000")));
        coordinator.shard(shard_a).commit(0).unwrap();
        coordinator.shard(shard_b).stage_write(0, key_b.clone(), StagedOp::Put(balance_item("B", "500")));
        coordinator.shard(shard_b).commit(0).unwrap();

        let debit = ResolvedOp {
            shard_id: shard_a,
            row_key: key_a.clone(),
            kind: OpKind::Update(
                UpdateExpression::new(
                    vec![(field("balance"), SetOperand::Minus(field("balance"), AttributeValue::N("100".into())))],
                    vec![],
                    vec![],
                    vec![],
                )
                .unwrap(),
            ),
            condition: Some(Condition::Compare {
                op: CompareOp::Ge,
                lhs: Operand::Path(field("balance")),
                rhs: Operand::Literal(AttributeValue::N("100".into())),
            }),
            return_old_on_condition_failure: false,
        };
        let credit = ResolvedOp {
            shard_id: shard_b,
            row_key: key_b.clone(),
            kind: OpKind::Update(
                UpdateExpression::new(
                    vec![(field("balance"), SetOperand::Plus(field("balance"), AttributeValue::N("100".into())))],
                    vec![],
                    vec![],
                    vec![],
                )
                .unwrap(),
            ),
            condition: None,
            return_old_on_condition_failure: false,
        };

        let result = coordinator.transact_write(vec![debit, credit]).unwrap();
        assert_eq!(result[0].as_ref().unwrap().get("balance"), Some(&AttributeValue::N("900".into())));
        assert_eq!(result[1].as_ref().unwrap().get("balance"), Some(&AttributeValue::N("600".into())));
    }

    #[test]
    fn failed_condition_cancels_whole_transaction_and_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator(dir.path(), 4);
        let (shard_a, key_a) = row("accounts", "A", 4);
        let (shard_b, key_b) = row("accounts", "B", 4);
        coordinator.shard(shard_a).stage_write(0, key_a.clone(), StagedOp::Put(balance_item("A", "50")));
        coordinator.shard(shard_a).commit(0).unwrap();
        coordinator.shard(shard_b).stage_write(0, key_b.clone(), StagedOp::Put(balance_item("B", "100")));
        coordinator.shard(shard_b).commit(0).unwrap();

        let debit = ResolvedOp {
            shard_id: shard_a,
            row_key: key_a.clone(),
            kind: OpKind::Update(
                UpdateExpression::new(
                    vec![(field("balance"), SetOperand::Minus(field("balance"), AttributeValue::N("100".into())))],
                    vec![],
                    vec![],
                    vec![],
                )
                .unwrap(),
            ),
            condition: Some(Condition::Compare {
                op: CompareOp::Ge,
                lhs: Operand::Path(field("balance")),
                rhs: Operand::Literal(AttributeValue::N("100".into())),
            }),
            return_old_on_condition_failure: false,
        };
        let credit = ResolvedOp {
            shard_id: shard_b,
            row_key: key_b.clone(),
            kind: OpKind::Update(
                UpdateExpression::new(
                    vec![(field("balance"), SetOperand::Plus(field("balance"), AttributeValue::N("100".into())))],
                    vec![],
                    vec![],
                    vec![],
                )
                .unwrap(),
            ),
            condition: None,
            return_old_on_condition_failure: false,
        };

        let reasons = coordinator.transact_write(vec![debit, credit]).unwrap_err();
        assert!(matches!(reasons[0], CancellationReason::ConditionalCheckFailed { .. }));
        assert_eq!(reasons[1], CancellationReason::None);

        assert_eq!(
            coordinator.shard(shard_a).read_committed(&key_a).unwrap().unwrap().get("balance"),
            Some(&AttributeValue::N("50".into()))
        );
        assert_eq!(
            coordinator.shard(shard_b).read_committed(&key_b).unwrap().unwrap().get("balance"),
            Some(&AttributeValue::N("100".into()))
        );
    }

    #[test]
    fn rejects_more_than_one_hundred_ops() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator(dir.path(), 1);
        let ops: Vec<ResolvedOp> = (0..101)
            .map(|i| {
                let (shard_id, row_key) = row("t", &format!("k{i}"), 1);
                ResolvedOp {
                    shard_id,
                    row_key,
                    kind: OpKind::Put(balance_item(&format!("k{i}"), "1")),
                    condition: None,
                    return_old_on_condition_failure: false,
                }
            })
            .collect();
        let err = coordinator.transact_write(ops).unwrap_err();
        assert!(matches!(err[0], CancellationReason::ValidationError(_)));
    }
}
