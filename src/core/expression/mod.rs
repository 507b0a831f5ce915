//! Condition and update AST types (spec §4.3).
//!
//! This module defines the tree shapes the evaluator consumes; building them
//! from a DynamoDB expression string is the out-of-scope expression parser's
//! job (spec §1) — callers (and this crate's tests) construct ASTs directly.

pub mod evaluator;

use crate::core::common::error::StoreError;
use crate::core::common::value::AttributeValue;

/// One segment of a dotted/indexed attribute path, e.g. `a.b[2].c` is
/// `[Field("a"), Field("b"), Index(2), Field("c")]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// A path into a (possibly nested) item.
pub type Path = Vec<PathSegment>;

/// Builds a single-field path — the common case.
#[must_use]
pub fn field(name: impl Into<String>) -> Path {
    vec![PathSegment::Field(name.into())]
}

/// An operand in a condition: either a literal value, a reference to another
/// attribute, or `size(path)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(AttributeValue),
    Path(Path),
    Size(Path),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A condition-expression AST node (spec §4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare { op: CompareOp, lhs: Operand, rhs: Operand },
    Between { operand: Operand, lower: Operand, upper: Operand },
    In { operand: Operand, candidates: Vec<Operand> },
    AttributeExists(Path),
    AttributeNotExists(Path),
    AttributeType(Path, String),
    BeginsWith(Path, Operand),
    Contains(Path, Operand),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

/// The right-hand side of a `SET` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOperand {
    Value(AttributeValue),
    Path(Path),
    Plus(Path, AttributeValue),
    Minus(Path, AttributeValue),
}

/// A fully-parsed `UpdateExpression`: any subset of the four clause kinds,
/// each possibly repeated, in any order at the call site — but every
/// attribute path must be touched by at most one clause (spec §4.3's
/// "undefined behavior... reject with a validation error").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpression {
    pub sets: Vec<(Path, SetOperand)>,
    pub removes: Vec<Path>,
    pub adds: Vec<(Path, AttributeValue)>,
    pub deletes: Vec<(Path, AttributeValue)>,
}

impl UpdateExpression {
    /// Builds an `UpdateExpression`, rejecting it if the same attribute path
    /// appears under more than one clause.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] if any path is referenced by two or
    /// more clauses.
    pub fn new(
        sets: Vec<(Path, SetOperand)>,
        removes: Vec<Path>,
        adds: Vec<(Path, AttributeValue)>,
        deletes: Vec<(Path, AttributeValue)>,
    ) -> Result<Self, StoreError> {
        let mut seen: Vec<&Path> = Vec::new();
        for path in sets.iter().map(|(p, _)| p).chain(removes.iter()).chain(
            adds.iter().map(|(p, _)| p).chain(deletes.iter().map(|(p, _)| p)),
        ) {
            if seen.contains(&path) {
                return Err(StoreError::Validation(format!(
                    "attribute path {path:?} referenced by more than one update clause"
                )));
            }
            seen.push(path);
        }
        Ok(Self { sets, removes, adds, deletes })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.removes.is_empty() && self.adds.is_empty() && self.deletes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overlapping_paths_across_clauses() {
        let path = field("balance");
        let err = UpdateExpression::new(
            vec![(path.clone(), SetOperand::Value(AttributeValue::N("1".into())))],
            vec![],
            vec![(path, AttributeValue::N("1".into()))],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn accepts_disjoint_paths() {
        let update = UpdateExpression::new(
            vec![(field("a"), SetOperand::Value(AttributeValue::N("1".into())))],
            vec![field("b")],
            vec![(field("c"), AttributeValue::N("1".into()))],
            vec![],
        )
        .unwrap();
        assert!(!update.is_empty());
    }
}
