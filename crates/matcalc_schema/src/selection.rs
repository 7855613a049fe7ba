//! Operand Selection
//!
//! State machine that drives binding formula placeholders to source columns.
//! At most one column is being wired at a time. Entering `Selecting` takes a
//! one-slot snapshot of the target formula so a cancel can roll back exactly.
//!
//! Transitions are named events invoked by the caller; the machine never
//! looks at input devices. Visual side effects are queued as
//! [`SelectionEvent`]s and drained by the caller.

use crate::column::{Formula, Operation, Operator};
use crate::registry::ColumnRegistry;
use matcalc_ids::ColumnId;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

/// The one surfaced failure of calculation editing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalculationError {
    #[error("define quantity before creating a calculation")]
    QuantityUndefined { column: ColumnId },
}

/// The slot currently awaiting a source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub target: ColumnId,
    pub operation_index: usize,
    pub operand_index: usize,
    /// The target itself plus every column already bound in its formula.
    pub excluded: BTreeSet<ColumnId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SelectionState {
    #[default]
    Idle,
    Selecting(Selection),
}

/// Side effects for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    /// A column's formula changed, or a bound operand was clicked.
    Flash(ColumnId),
    /// Columns that may be picked for the active slot.
    Highlight(Vec<ColumnId>),
}

/// A confirmed-before-applied removal of one bound operand.
#[derive(Debug, Clone, PartialEq)]
pub struct OperandRemoval {
    pub target: ColumnId,
    pub before: Formula,
    pub after: Formula,
    /// Human-readable confirmation describing the change.
    pub prompt: String,
    /// True when the whole calculation goes away.
    pub clears_formula: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    target: ColumnId,
    formula: Formula,
}

#[derive(Debug, Clone, Default)]
pub struct OperandSelector {
    state: SelectionState,
    backup: Option<Snapshot>,
    events: Vec<SelectionEvent>,
}

impl OperandSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn active(&self) -> Option<&Selection> {
        match &self.state {
            SelectionState::Selecting(selection) => Some(selection),
            SelectionState::Idle => None,
        }
    }

    pub fn is_selecting(&self) -> bool {
        self.active().is_some()
    }

    /// Column whose formula is currently backed up, if any.
    pub fn snapshot_target(&self) -> Option<&ColumnId> {
        self.backup.as_ref().map(|snapshot| &snapshot.target)
    }

    pub fn drain_events(&mut self) -> Vec<SelectionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Columns that may be bound to the active slot, in display order.
    pub fn eligible_columns(&self, registry: &ColumnRegistry) -> Vec<ColumnId> {
        let Some(selection) = self.active() else {
            return Vec::new();
        };
        registry
            .columns()
            .iter()
            .filter(|column| {
                !selection.excluded.contains(&column.id) && column.is_selectable_for_calculation()
            })
            .map(|column| column.id.clone())
            .collect()
    }

    /// Append a new operation to `target` and start selecting its first operand.
    ///
    /// The first operation of a formula gets two placeholders, later ones
    /// get one. Attaching to the column already being wired does nothing.
    pub fn attach_operation(
        &mut self,
        registry: &mut ColumnRegistry,
        target: &ColumnId,
        operator: Operator,
    ) -> Result<bool, CalculationError> {
        if self.active().is_some_and(|selection| &selection.target == target) {
            return Ok(false);
        }
        let Some(column) = registry.column(target) else {
            return Ok(false);
        };
        if column.blocks_on_quantity_question() {
            debug!(column = %target, "calculation rejected: quantity undefined");
            return Err(CalculationError::QuantityUndefined {
                column: target.clone(),
            });
        }
        if !column.supports_calculation() {
            return Ok(false);
        }

        self.cancel(registry);

        let Some(column) = registry.column_mut(target) else {
            return Ok(false);
        };
        let before = column.formula.clone();
        let placeholders = if before.is_empty() { 2 } else { 1 };
        column
            .formula
            .operations
            .push(Operation::with_placeholders(operator, placeholders));
        let operation_index = column.formula.operations.len() - 1;

        debug!(column = %target, %operator, "operation attached");
        self.backup = Some(Snapshot {
            target: target.clone(),
            formula: before,
        });
        self.enter(registry, target, operation_index, 0);
        self.events.push(SelectionEvent::Flash(target.clone()));
        Ok(true)
    }

    /// Click on an operand. Unbound operands start selection for that slot;
    /// bound ones flash their source column.
    pub fn click_operand(
        &mut self,
        registry: &mut ColumnRegistry,
        target: &ColumnId,
        operation_index: usize,
        operand_index: usize,
    ) -> bool {
        let bound = match registry
            .column(target)
            .and_then(|column| column.formula.operand(operation_index, operand_index))
        {
            Some(operand) => operand.bound.clone(),
            None => return false,
        };
        if let Some(source) = bound {
            self.events.push(SelectionEvent::Flash(source));
            return false;
        }

        self.leave_other_target(registry, target);
        if self.snapshot_target() != Some(target) {
            self.take_snapshot(registry, target);
        }
        self.enter(registry, target, operation_index, operand_index);
        true
    }

    /// Double-click on a bound operand: unbind it and select a new source.
    pub fn rebind_operand(
        &mut self,
        registry: &mut ColumnRegistry,
        target: &ColumnId,
        operation_index: usize,
        operand_index: usize,
    ) -> bool {
        let is_bound = registry
            .column(target)
            .and_then(|column| column.formula.operand(operation_index, operand_index))
            .is_some_and(|operand| operand.is_bound());
        if !is_bound {
            return false;
        }

        self.leave_other_target(registry, target);
        if self.snapshot_target() != Some(target) {
            self.take_snapshot(registry, target);
        }
        if let Some(operand) = registry
            .column_mut(target)
            .and_then(|column| column.formula.operand_mut(operation_index, operand_index))
        {
            operand.unbind();
        }

        debug!(column = %target, operation_index, operand_index, "operand unbound");
        self.enter(registry, target, operation_index, operand_index);
        self.events.push(SelectionEvent::Flash(target.clone()));
        true
    }

    /// Bind the active slot to `source` and advance to the next placeholder.
    pub fn select_column(&mut self, registry: &mut ColumnRegistry, source: &ColumnId) -> bool {
        let Some(selection) = self.active().cloned() else {
            return false;
        };
        if !self.eligible_columns(registry).contains(source) {
            return false;
        }
        let Some(source_column) = registry.column(source).cloned() else {
            return false;
        };
        let Some(column) = registry.column_mut(&selection.target) else {
            return false;
        };
        let Some(operand) = column
            .formula
            .operand_mut(selection.operation_index, selection.operand_index)
        else {
            return false;
        };
        operand.bind(&source_column);
        debug!(column = %selection.target, source = %source, "operand bound");

        let next = column
            .formula
            .next_pending_from(selection.operation_index, selection.operand_index + 1);
        match next {
            Some((operation_index, operand_index)) => {
                self.enter(registry, &selection.target, operation_index, operand_index)
            }
            None => {
                self.state = SelectionState::Idle;
                self.backup = None;
            }
        }
        self.events.push(SelectionEvent::Flash(selection.target));
        true
    }

    /// Leave `Selecting`, restoring the snapshot or pruning placeholders.
    pub fn cancel(&mut self, registry: &mut ColumnRegistry) -> bool {
        let SelectionState::Selecting(selection) = std::mem::take(&mut self.state) else {
            return false;
        };
        let snapshot = self
            .backup
            .take()
            .filter(|snapshot| snapshot.target == selection.target);

        if let Some(column) = registry.column_mut(&selection.target) {
            match snapshot {
                Some(snapshot) => column.formula = snapshot.formula,
                None => column.formula.prune_unbound(),
            }
        }
        debug!(column = %selection.target, "selection cancelled");
        self.events.push(SelectionEvent::Flash(selection.target));
        true
    }

    /// Pointer interaction outside any selection surface. Only cancels when
    /// the formula being edited has no pending operand.
    pub fn pointer_outside(&mut self, registry: &mut ColumnRegistry) -> bool {
        let pending = match self.active() {
            Some(selection) => registry
                .column(&selection.target)
                .is_some_and(|column| column.formula.has_pending()),
            None => return false,
        };
        if pending {
            return false;
        }
        self.cancel(registry)
    }

    /// Describe the removal of a bound operand without applying it.
    pub fn plan_operand_removal(
        &self,
        registry: &ColumnRegistry,
        target: &ColumnId,
        operation_index: usize,
        operand_index: usize,
    ) -> Option<OperandRemoval> {
        let column = registry.column(target)?;
        let before = column.formula.clone();
        if !before.operand(operation_index, operand_index)?.is_bound() {
            return None;
        }

        let clears_formula =
            before.operations.len() == 1 && before.operations[0].operands.len() <= 2;
        let (after, prompt) = if clears_formula {
            let prompt = format!(
                "Remove the calculation '{}' from '{}'?",
                before.describe(),
                column.display_title()
            );
            (Formula::default(), prompt)
        } else {
            let mut after = before.clone();
            after.operations[operation_index].operands.remove(operand_index);
            after
                .operations
                .retain(|operation| !operation.operands.is_empty());
            let prompt = format!(
                "Change the calculation of '{}' from '{}' to '{}'?",
                column.display_title(),
                before.describe(),
                after.describe()
            );
            (after, prompt)
        };

        Some(OperandRemoval {
            target: target.clone(),
            before,
            after,
            prompt,
            clears_formula,
        })
    }

    /// Apply a confirmed removal. Refused if the formula changed since planning.
    pub fn apply_operand_removal(
        &mut self,
        registry: &mut ColumnRegistry,
        removal: &OperandRemoval,
    ) -> bool {
        let Some(column) = registry.column_mut(&removal.target) else {
            return false;
        };
        if column.formula != removal.before {
            return false;
        }
        column.formula = removal.after.clone();

        if self.active().is_some_and(|selection| selection.target == removal.target) {
            self.state = SelectionState::Idle;
        }
        if self.snapshot_target() == Some(&removal.target) {
            self.backup = None;
        }
        debug!(column = %removal.target, cleared = removal.clears_formula, "operand removed");
        self.events.push(SelectionEvent::Flash(removal.target.clone()));
        true
    }

    /// Keep the machine consistent after a column left the registry.
    ///
    /// The backup forgets every reference to the removed column, so a later
    /// cancel cannot bring it back. Purging may shift the target's operands,
    /// so the active slot is re-anchored on the first pending operand.
    pub fn column_removed(&mut self, registry: &ColumnRegistry, id: &ColumnId) {
        if self.snapshot_target() == Some(id) {
            self.backup = None;
        } else if let Some(snapshot) = self.backup.as_mut() {
            snapshot.formula.remove_references(id);
        }

        let Some(selection) = self.active().cloned() else {
            return;
        };
        if &selection.target == id {
            self.state = SelectionState::Idle;
            return;
        }

        let formula = registry.column(&selection.target).map(|column| &column.formula);
        let slot_pending = formula
            .and_then(|formula| {
                formula.operand(selection.operation_index, selection.operand_index)
            })
            .is_some_and(|operand| !operand.is_bound());
        let slot = if slot_pending {
            Some((selection.operation_index, selection.operand_index))
        } else {
            formula.and_then(|formula| formula.next_pending_from(0, 0))
        };

        match slot {
            Some((operation_index, operand_index)) => {
                self.enter(registry, &selection.target, operation_index, operand_index)
            }
            None => {
                debug!(column = %selection.target, "no pending operand left after removal");
                self.state = SelectionState::Idle;
                self.backup = None;
            }
        }
    }

    fn leave_other_target(&mut self, registry: &mut ColumnRegistry, target: &ColumnId) {
        if self.active().is_some_and(|selection| &selection.target != target) {
            self.cancel(registry);
        }
    }

    fn take_snapshot(&mut self, registry: &ColumnRegistry, target: &ColumnId) {
        self.backup = registry.column(target).map(|column| Snapshot {
            target: target.clone(),
            formula: column.formula.clone(),
        });
    }

    fn enter(
        &mut self,
        registry: &ColumnRegistry,
        target: &ColumnId,
        operation_index: usize,
        operand_index: usize,
    ) {
        let mut excluded: BTreeSet<ColumnId> = registry
            .column(target)
            .map(|column| column.formula.bound_columns().cloned().collect())
            .unwrap_or_default();
        excluded.insert(target.clone());

        self.state = SelectionState::Selecting(Selection {
            target: target.clone(),
            operation_index,
            operand_index,
            excluded,
        });
        let eligible = self.eligible_columns(registry);
        self.events.push(SelectionEvent::Highlight(eligible));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::BaseKind;

    fn registry_with_weight() -> (ColumnRegistry, ColumnId) {
        let mut registry = ColumnRegistry::with_default_columns();
        let weight = registry.add_attribute_column();
        registry.rename_column(&weight, "Weight");
        registry.answer_quantity_question(&weight, true);
        (registry, weight)
    }

    fn slot(selector: &OperandSelector) -> (ColumnId, usize, usize) {
        let selection = selector.active().expect("selecting");
        (
            selection.target.clone(),
            selection.operation_index,
            selection.operand_index,
        )
    }

    #[test]
    fn test_attach_seeds_two_then_one_placeholder() {
        let (mut registry, weight) = registry_with_weight();
        let unit_cost = BaseKind::UnitCost.column_id();
        let mut selector = OperandSelector::new();

        assert!(selector
            .attach_operation(&mut registry, &unit_cost, Operator::Divide)
            .unwrap());
        assert_eq!(slot(&selector), (unit_cost.clone(), 0, 0));
        let formula = &registry.column(&unit_cost).unwrap().formula;
        assert_eq!(formula.operations[0].operands.len(), 2);

        // Same target while selecting: nothing happens.
        assert!(!selector
            .attach_operation(&mut registry, &unit_cost, Operator::Add)
            .unwrap());

        assert!(selector.select_column(&mut registry, &weight));
        assert!(selector.select_column(&mut registry, &BaseKind::Quantity.column_id()));
        assert!(!selector.is_selecting());

        assert!(selector
            .attach_operation(&mut registry, &unit_cost, Operator::Multiply)
            .unwrap());
        let formula = &registry.column(&unit_cost).unwrap().formula;
        assert_eq!(formula.operations.len(), 2);
        assert_eq!(formula.operations[1].operands.len(), 1);
        assert_eq!(slot(&selector), (unit_cost, 1, 0));
    }

    #[test]
    fn test_attach_rejects_undecided_attribute() {
        let mut registry = ColumnRegistry::with_default_columns();
        let density = registry.add_attribute_column();
        let mut selector = OperandSelector::new();

        let err = selector
            .attach_operation(&mut registry, &density, Operator::Multiply)
            .unwrap_err();
        assert_eq!(err.to_string(), "define quantity before creating a calculation");
        assert!(!selector.is_selecting());

        // Unsupported columns are silently ignored.
        let detail = BaseKind::Detail.column_id();
        assert!(!selector
            .attach_operation(&mut registry, &detail, Operator::Multiply)
            .unwrap());
    }

    #[test]
    fn test_excluded_and_eligible_columns() {
        let (mut registry, weight) = registry_with_weight();
        let total = BaseKind::Total.column_id();
        let mut selector = OperandSelector::new();
        selector
            .attach_operation(&mut registry, &total, Operator::Divide)
            .unwrap();

        let selection = selector.active().unwrap();
        assert!(selection.excluded.contains(&total));
        assert!(selection.excluded.contains(&BaseKind::Quantity.column_id()));
        assert!(selection.excluded.contains(&BaseKind::UnitCost.column_id()));
        assert_eq!(selector.eligible_columns(&registry), vec![weight.clone()]);

        let events = selector.drain_events();
        assert!(events.contains(&SelectionEvent::Highlight(vec![weight])));
        assert!(events.contains(&SelectionEvent::Flash(total.clone())));

        // Ineligible picks are ignored.
        assert!(!selector.select_column(&mut registry, &BaseKind::Detail.column_id()));
        assert!(!selector.select_column(&mut registry, &total));
    }

    #[test]
    fn test_cancel_restores_snapshot() {
        let (mut registry, _) = registry_with_weight();
        let total = BaseKind::Total.column_id();
        let before = registry.column(&total).unwrap().formula.clone();
        let mut selector = OperandSelector::new();

        selector
            .attach_operation(&mut registry, &total, Operator::Add)
            .unwrap();
        assert!(selector.cancel(&mut registry));
        assert_eq!(registry.column(&total).unwrap().formula, before);
        assert!(selector.snapshot_target().is_none());
        assert!(!selector.cancel(&mut registry));
    }

    #[test]
    fn test_rebind_then_cancel_round_trips() {
        let (mut registry, weight) = registry_with_weight();
        let total = BaseKind::Total.column_id();
        let before = registry.column(&total).unwrap().formula.clone();
        let mut selector = OperandSelector::new();

        assert!(selector.rebind_operand(&mut registry, &total, 0, 1));
        assert_eq!(slot(&selector), (total.clone(), 0, 1));
        assert!(registry.column(&total).unwrap().formula.has_pending());
        assert_eq!(selector.eligible_columns(&registry), vec![
            weight,
            BaseKind::UnitCost.column_id()
        ]);

        // Rebinding another slot of the same column keeps the first snapshot.
        assert!(selector.rebind_operand(&mut registry, &total, 0, 0));
        assert!(selector.cancel(&mut registry));
        assert_eq!(registry.column(&total).unwrap().formula, before);
    }

    #[test]
    fn test_click_operand() {
        let (mut registry, weight) = registry_with_weight();
        let total = BaseKind::Total.column_id();
        let mut selector = OperandSelector::new();

        assert!(!selector.click_operand(&mut registry, &total, 0, 0));
        assert_eq!(
            selector.drain_events(),
            vec![SelectionEvent::Flash(BaseKind::Quantity.column_id())]
        );

        selector
            .attach_operation(&mut registry, &total, Operator::Multiply)
            .unwrap();
        selector.select_column(&mut registry, &weight);
        assert!(!selector.is_selecting());

        // Leave a placeholder behind without a snapshot, then click it.
        registry
            .column_mut(&total)
            .unwrap()
            .formula
            .operations
            .push(Operation::with_placeholders(Operator::Add, 1));
        assert!(selector.click_operand(&mut registry, &total, 2, 0));
        assert_eq!(slot(&selector), (total.clone(), 2, 0));
        assert!(!selector.pointer_outside(&mut registry));
        assert!(selector.is_selecting());
    }

    #[test]
    fn test_cancel_without_snapshot_prunes() {
        let (mut registry, _) = registry_with_weight();
        let total = BaseKind::Total.column_id();
        let mut selector = OperandSelector::new();
        registry
            .column_mut(&total)
            .unwrap()
            .formula
            .operations
            .push(Operation::with_placeholders(Operator::Add, 1));

        selector.click_operand(&mut registry, &total, 1, 0);
        selector.column_removed(&registry, &ColumnId::attribute(99));
        selector.backup = None;
        selector.cancel(&mut registry);
        let formula = &registry.column(&total).unwrap().formula;
        assert_eq!(formula.operations.len(), 1);
        assert!(formula.is_complete());
    }

    #[test]
    fn test_advances_forward_only() {
        let (mut registry, weight) = registry_with_weight();
        let unit_cost = BaseKind::UnitCost.column_id();
        let mut selector = OperandSelector::new();

        selector
            .attach_operation(&mut registry, &unit_cost, Operator::Multiply)
            .unwrap();
        assert!(selector.click_operand(&mut registry, &unit_cost, 0, 1));
        selector.select_column(&mut registry, &weight);

        // Slot 0 is still pending but lies behind the resolved one.
        assert!(!selector.is_selecting());
        assert!(registry.column(&unit_cost).unwrap().formula.has_pending());
    }

    #[test]
    fn test_operand_removal_plans() {
        let (mut registry, weight) = registry_with_weight();
        let total = BaseKind::Total.column_id();
        let mut selector = OperandSelector::new();

        let plan = selector
            .plan_operand_removal(&registry, &total, 0, 0)
            .unwrap();
        assert!(plan.clears_formula);
        assert!(plan.prompt.contains("Quantity × Unit Cost"));

        selector
            .attach_operation(&mut registry, &total, Operator::Divide)
            .unwrap();
        selector.select_column(&mut registry, &weight);
        let plan = selector
            .plan_operand_removal(&registry, &total, 1, 0)
            .unwrap();
        assert!(!plan.clears_formula);
        assert_eq!(plan.after.describe(), "Quantity × Unit Cost");

        // A stale plan is refused.
        let stale = selector
            .plan_operand_removal(&registry, &total, 0, 0)
            .unwrap();
        assert!(selector.apply_operand_removal(&mut registry, &plan));
        assert!(!selector.apply_operand_removal(&mut registry, &stale));
        assert_eq!(
            registry.column(&total).unwrap().formula.describe(),
            "Quantity × Unit Cost"
        );

        assert!(selector
            .plan_operand_removal(&registry, &total, 5, 0)
            .is_none());
    }

    #[test]
    fn test_column_removed_resets_target() {
        let (mut registry, weight) = registry_with_weight();
        let mut selector = OperandSelector::new();
        selector
            .attach_operation(&mut registry, &weight, Operator::Multiply)
            .unwrap();
        selector.column_removed(&registry, &weight);
        assert!(!selector.is_selecting());
        assert!(selector.snapshot_target().is_none());
    }

    #[test]
    fn test_cancel_after_removal_keeps_column_out() {
        let (mut registry, weight) = registry_with_weight();
        let total = BaseKind::Total.column_id();
        let mut selector = OperandSelector::new();

        selector
            .attach_operation(&mut registry, &total, Operator::Multiply)
            .unwrap();
        assert!(selector.select_column(&mut registry, &weight));
        assert_eq!(
            registry.column(&total).unwrap().formula.describe(),
            "Quantity × Unit Cost × Weight"
        );

        assert!(selector.rebind_operand(&mut registry, &total, 0, 1));
        assert!(registry.remove_column(&weight));
        selector.column_removed(&registry, &weight);
        assert!(selector.cancel(&mut registry));

        let formula = &registry.column(&total).unwrap().formula;
        assert!(!formula.references(&weight));
        assert_eq!(formula.describe(), "Quantity × Unit Cost");
    }

    #[test]
    fn test_removal_reanchors_active_slot() {
        let mut registry = ColumnRegistry::with_default_columns();
        let total = BaseKind::Total.column_id();
        let quantity = BaseKind::Quantity.column_id();
        let unit_cost = BaseKind::UnitCost.column_id();
        let mut selector = OperandSelector::new();

        assert!(selector.rebind_operand(&mut registry, &total, 0, 1));
        assert!(registry.remove_column(&quantity));
        selector.column_removed(&registry, &quantity);

        // The placeholder moved from slot 1 to slot 0.
        assert_eq!(slot(&selector), (total.clone(), 0, 0));
        assert!(!selector.active().unwrap().excluded.contains(&quantity));
        assert!(selector.eligible_columns(&registry).contains(&unit_cost));

        assert!(selector.select_column(&mut registry, &unit_cost));
        assert!(!selector.is_selecting());
        assert_eq!(
            registry.column(&total).unwrap().formula.describe(),
            "Unit Cost"
        );
    }
}
