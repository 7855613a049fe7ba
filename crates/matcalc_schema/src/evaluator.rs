//! Formula evaluation over a row draft.
//!
//! The pass is fixed and two-phase: attribute formulas first, in display
//! order, then base formulas, which therefore see fresh attribute values.
//! Nothing here fails; a formula that cannot be computed leaves its target
//! value untouched.

use crate::column::Formula;
use crate::registry::ColumnRegistry;
use matcalc_ids::ColumnId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Raw string values of one row being edited, keyed by column id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowDraft {
    values: BTreeMap<ColumnId, String>,
}

impl RowDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: ColumnId, value: impl Into<String>) {
        self.values.insert(column, value.into());
    }

    pub fn get(&self, column: &ColumnId) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    /// Numeric reading of a cell; missing or unparseable cells read as 0.
    pub fn number(&self, column: &ColumnId) -> f64 {
        self.get(column).map(parse_numeric).unwrap_or(0.0)
    }

    pub fn remove(&mut self, column: &ColumnId) -> Option<String> {
        self.values.remove(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnId, &str)> {
        self.values.iter().map(|(id, value)| (id, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(ColumnId, String)> for RowDraft {
    fn from_iter<T: IntoIterator<Item = (ColumnId, String)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Permissive number parsing: a decimal comma is accepted, anything invalid
/// or non-finite reads as 0.
pub fn parse_numeric(raw: &str) -> f64 {
    raw.trim()
        .replacen(',', ".", 1)
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Plain decimal rendering written back into the draft.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

/// Compute a formula against the draft.
///
/// Each operation's value is the product of its operands. The first
/// operation combines with its operator's identity, later ones with the
/// running result. Returns `None` for empty or pending formulas, division
/// by zero and non-finite results.
pub fn evaluate_formula(formula: &Formula, draft: &RowDraft) -> Option<f64> {
    if !formula.is_complete() || !formula.has_resolved_operands() {
        return None;
    }

    let mut running: Option<f64> = None;
    for operation in &formula.operations {
        let product: f64 = operation
            .operands
            .iter()
            .filter_map(|operand| operand.bound.as_ref())
            .map(|column| draft.number(column))
            .product();
        let acc = running.unwrap_or_else(|| operation.operator.identity());
        running = Some(operation.operator.apply(acc, product)?);
    }
    running.filter(|value| value.is_finite())
}

/// Recompute every derived column in place. Returns the columns whose value
/// was written.
pub fn evaluate_in_place(registry: &ColumnRegistry, draft: &mut RowDraft) -> Vec<ColumnId> {
    let attributes = registry.attributes();
    let bases = registry.base_columns();
    let mut updated = Vec::new();

    for column in attributes.chain(bases) {
        if column.formula.is_empty() {
            continue;
        }
        match evaluate_formula(&column.formula, draft) {
            Some(value) => {
                draft.set(column.id.clone(), format_number(value));
                updated.push(column.id.clone());
            }
            None => trace!(column = %column.id, "formula not evaluated"),
        }
    }
    updated
}

/// Pure form of [`evaluate_in_place`].
pub fn evaluate(registry: &ColumnRegistry, draft: &RowDraft) -> RowDraft {
    let mut next = draft.clone();
    evaluate_in_place(registry, &mut next);
    next
}
