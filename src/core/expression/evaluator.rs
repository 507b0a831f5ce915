//! Evaluates [`Condition`] trees and applies [`UpdateExpression`]s over an
//! [`Item`], generalizing the host codebase's `evaluate_expression` (flat
//! `Tuple` + `Schema` columns) to paths through nested `AttributeValue`s.

use std::collections::BTreeMap;

use crate::core::common::value::{AttributeValue, Item};
use crate::core::expression::{
    CompareOp, Condition, Operand, Path, PathSegment, SetOperand, UpdateExpression,
};

/// Looks up `path` inside `item`, returning `None` if any segment is absent
/// or type-mismatched (e.g. an `Index` segment into a non-list).
#[must_use]
pub fn resolve(item: &Item, path: &Path) -> Option<AttributeValue> {
    let mut segments = path.iter();
    let first = match segments.next()? {
        PathSegment::Field(name) => item.get(name)?.clone(),
        PathSegment::Index(_) => return None,
    };
    segments.try_fold(first, |current, segment| match (segment, current) {
        (PathSegment::Field(name), AttributeValue::M(map)) => map.get(name).cloned(),
        (PathSegment::Index(i), AttributeValue::L(list)) => list.get(*i).cloned(),
        _ => None,
    })
}

fn resolve_operand(item: &Item, operand: &Operand) -> Option<AttributeValue> {
    match operand {
        Operand::Literal(value) => Some(value.clone()),
        Operand::Path(path) => resolve(item, path),
        Operand::Size(path) => resolve(item, path)
            .and_then(|value| value.size())
            .map(|size| AttributeValue::N(size.to_string())),
    }
}

/// Evaluates a condition-expression tree against an item.
///
/// Per spec §4.3, referencing an attribute that does not exist makes the
/// surrounding comparison `false` rather than an error (only
/// `attribute_not_exists` treats absence as meaningful).
#[must_use]
pub fn evaluate_condition(condition: &Condition, item: &Item) -> bool {
    match condition {
        Condition::Compare { op, lhs, rhs } => {
            let (Some(lhs), Some(rhs)) = (resolve_operand(item, lhs), resolve_operand(item, rhs))
            else {
                return false;
            };
            match op {
                CompareOp::Eq => lhs.eq_value(&rhs),
                CompareOp::Ne => !lhs.eq_value(&rhs),
                CompareOp::Lt => lhs.compare(&rhs) == Some(std::cmp::Ordering::Less),
                CompareOp::Le => matches!(
                    lhs.compare(&rhs),
                    Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                ),
                CompareOp::Gt => lhs.compare(&rhs) == Some(std::cmp::Ordering::Greater),
                CompareOp::Ge => matches!(
                    lhs.compare(&rhs),
                    Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                ),
            }
        }
        Condition::Between { operand, lower, upper } => {
            let (Some(value), Some(lower), Some(upper)) = (
                resolve_operand(item, operand),
                resolve_operand(item, lower),
                resolve_operand(item, upper),
            ) else {
                return false;
            };
            matches!(
                value.compare(&lower),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ) && matches!(
                value.compare(&upper),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            )
        }
        Condition::In { operand, candidates } => {
            let Some(value) = resolve_operand(item, operand) else {
                return false;
            };
            candidates.iter().filter_map(|c| resolve_operand(item, c)).any(|c| c.eq_value(&value))
        }
        Condition::AttributeExists(path) => resolve(item, path).is_some(),
        Condition::AttributeNotExists(path) => resolve(item, path).is_none(),
        Condition::AttributeType(path, type_name) => {
            resolve(item, path).is_some_and(|v| v.type_name() == type_name)
        }
        Condition::BeginsWith(path, prefix) => {
            let (Some(value), Some(prefix)) = (resolve(item, path), resolve_operand(item, prefix))
            else {
                return false;
            };
            value.begins_with(&prefix)
        }
        Condition::Contains(path, needle) => {
            let (Some(value), Some(needle)) = (resolve(item, path), resolve_operand(item, needle))
            else {
                return false;
            };
            value.contains_value(&needle)
        }
        Condition::And(lhs, rhs) => evaluate_condition(lhs, item) && evaluate_condition(rhs, item),
        Condition::Or(lhs, rhs) => evaluate_condition(lhs, item) || evaluate_condition(rhs, item),
        Condition::Not(inner) => !evaluate_condition(inner, item),
    }
}

fn set_at(item: &mut Item, path: &Path, value: AttributeValue) {
    let Some((PathSegment::Field(head), rest)) = path.split_first() else { return };
    if rest.is_empty() {
        item.insert(head.clone(), value);
        return;
    }
    let slot = item
        .entry(head.clone())
        .or_insert_with(|| AttributeValue::M(BTreeMap::new()));
    set_at_nested(slot, rest, value);
}

fn set_at_nested(current: &mut AttributeValue, path: &[PathSegment], value: AttributeValue) {
    let (head, rest) = match path.split_first() {
        Some(pair) => pair,
        None => {
            *current = value;
            return;
        }
    };
    match head {
        PathSegment::Field(name) => {
            if !matches!(current, AttributeValue::M(_)) {
                *current = AttributeValue::M(BTreeMap::new());
            }
            let AttributeValue::M(map) = current else { unreachable!() };
            let slot = map.entry(name.clone()).or_insert_with(|| AttributeValue::M(BTreeMap::new()));
            if rest.is_empty() {
                *slot = value;
            } else {
                set_at_nested(slot, rest, value);
            }
        }
        PathSegment::Index(i) => {
            if !matches!(current, AttributeValue::L(_)) {
                *current = AttributeValue::L(Vec::new());
            }
            let AttributeValue::L(list) = current else { unreachable!() };
            while list.len() <= *i {
                list.push(AttributeValue::Null);
            }
            if rest.is_empty() {
                list[*i] = value;
            } else {
                set_at_nested(&mut list[*i], rest, value);
            }
        }
    }
}

fn remove_at(item: &mut Item, path: &Path) {
    let Some((PathSegment::Field(head), rest)) = path.split_first() else { return };
    if rest.is_empty() {
        item.remove(head);
        return;
    }
    if let Some(slot) = item.get_mut(head) {
        remove_at_nested(slot, rest);
    }
}

fn remove_at_nested(current: &mut AttributeValue, path: &[PathSegment]) {
    match path.split_first() {
        None => {}
        Some((PathSegment::Field(name), rest)) => {
            if let AttributeValue::M(map) = current {
                if rest.is_empty() {
                    map.remove(name);
                } else if let Some(slot) = map.get_mut(name) {
                    remove_at_nested(slot, rest);
                }
            }
        }
        Some((PathSegment::Index(i), rest)) => {
            if let AttributeValue::L(list) = current {
                if rest.is_empty() {
                    if *i < list.len() {
                        list.remove(*i);
                    }
                } else if let Some(slot) = list.get_mut(*i) {
                    remove_at_nested(slot, rest);
                }
            }
        }
    }
}

/// Applies an update expression's four clause kinds in `SET` → `REMOVE` →
/// `ADD` → `DELETE` order. [`UpdateExpression::new`] already guarantees no
/// path is shared between clauses, so the order has no observable effect on
/// disjoint paths; it only fixes the order operations are attempted in.
#[must_use]
pub fn apply_update(update: &UpdateExpression, item: &Item) -> Item {
    let mut result = item.clone();

    for (path, operand) in &update.sets {
        let value = match operand {
            SetOperand::Value(value) => value.clone(),
            SetOperand::Path(source) => match resolve(&result, source) {
                Some(value) => value,
                None => continue,
            },
            SetOperand::Plus(source, delta) => {
                let current = resolve(&result, source).unwrap_or_else(|| AttributeValue::N("0".into()));
                match current.numeric_add(delta) {
                    Some(sum) => sum,
                    None => continue,
                }
            }
            SetOperand::Minus(source, delta) => {
                let current = resolve(&result, source).unwrap_or_else(|| AttributeValue::N("0".into()));
                match current.numeric_sub(delta) {
                    Some(diff) => diff,
                    None => continue,
                }
            }
        };
        set_at(&mut result, path, value);
    }

    for path in &update.removes {
        remove_at(&mut result, path);
    }

    for (path, delta) in &update.adds {
        let updated = match resolve(&result, path) {
            Some(AttributeValue::N(_)) | None => {
                let current = resolve(&result, path).unwrap_or_else(|| AttributeValue::N("0".into()));
                current.numeric_add(delta)
            }
            Some(existing) => existing.set_union(delta),
        };
        if let Some(value) = updated {
            set_at(&mut result, path, value);
        }
    }

    for (path, subtrahend) in &update.deletes {
        if let Some(existing) = resolve(&result, path) {
            if let Some(remaining) = existing.set_difference(subtrahend) {
                set_at(&mut result, path, remaining);
            }
        }
    }

    result
}
