//! Template editing session.
//!
//! [`TemplateEditor`] owns the registry, the selection machine and the row
//! draft of the template being edited. Every mutation runs to completion and
//! is followed by a synchronous evaluation pass, so readers never observe a
//! stale derived value.

use crate::column::{BaseKind, Column, Formula, Operator};
use crate::evaluator::{evaluate_in_place, RowDraft};
use crate::persistence::{submit_template, SubmitError, TemplateStore};
use crate::record::TemplateRecord;
use crate::registry::ColumnRegistry;
use crate::selection::{
    CalculationError, OperandRemoval, OperandSelector, SelectionEvent, SelectionState,
};
use crate::serializer::{serialize, validate, TemplatePayload, ValidationError};
use matcalc_ids::ColumnId;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_FLASH_DURATION: Duration = Duration::from_millis(1000);

/// Presentation side effects produced by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Briefly highlight a column whose formula changed.
    Flash { column: ColumnId, duration: Duration },
    /// Columns selectable for the active operand slot.
    Highlight(Vec<ColumnId>),
}

#[derive(Debug, Clone)]
pub struct TemplateEditor {
    registry: ColumnRegistry,
    selector: OperandSelector,
    draft: RowDraft,
    notifications: Vec<Notification>,
    flash_duration: Duration,
}

impl Default for TemplateEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEditor {
    /// A new template with the default columns.
    pub fn new() -> Self {
        Self::from_registry(ColumnRegistry::with_default_columns())
    }

    pub fn from_registry(registry: ColumnRegistry) -> Self {
        Self {
            registry,
            selector: OperandSelector::new(),
            draft: RowDraft::new(),
            notifications: Vec::new(),
            flash_duration: DEFAULT_FLASH_DURATION,
        }
    }

    pub fn from_record(record: &TemplateRecord) -> Self {
        Self::from_registry(ColumnRegistry::from_record(record))
    }

    pub fn with_flash_duration(mut self, duration: Duration) -> Self {
        self.flash_duration = duration;
        self
    }

    /// Switch to another template, dropping all session state.
    pub fn load(&mut self, record: &TemplateRecord) {
        debug!(template = record.id, "loading template into editor");
        self.registry = ColumnRegistry::from_record(record);
        self.selector = OperandSelector::new();
        self.draft = RowDraft::new();
        self.notifications.clear();
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn selection(&self) -> &SelectionState {
        self.selector.state()
    }

    pub fn draft(&self) -> &RowDraft {
        &self.draft
    }

    pub fn flash_duration(&self) -> Duration {
        self.flash_duration
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn eligible_columns(&self) -> Vec<ColumnId> {
        self.selector.eligible_columns(&self.registry)
    }

    // Row draft

    /// Write a raw cell value and recompute derived columns.
    pub fn set_value(&mut self, column: &ColumnId, value: impl Into<String>) {
        self.draft.set(column.clone(), value);
        self.refresh();
    }

    // Lifecycle

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.registry.set_title(title);
    }

    pub fn add_base_column(&mut self, kind: BaseKind) -> bool {
        self.mutate(|registry| registry.add_base_column(kind))
    }

    pub fn add_attribute_column(&mut self) -> ColumnId {
        self.mutate(ColumnRegistry::add_attribute_column)
    }

    pub fn answer_quantity_question(&mut self, id: &ColumnId, is_quantity: bool) -> bool {
        self.mutate(|registry| registry.answer_quantity_question(id, is_quantity))
    }

    pub fn rename_column(&mut self, id: &ColumnId, title: impl Into<String>) -> bool {
        let title = title.into();
        self.mutate(|registry| registry.rename_column(id, title))
    }

    /// Remove a column. An in-progress selection on it is cancelled first so
    /// the removed definition carries no placeholders.
    pub fn remove_column(&mut self, id: &ColumnId) -> bool {
        let removable = self.registry.column(id).is_some_and(Column::is_removable);
        if removable && self.selector.active().is_some_and(|s| &s.target == id) {
            self.selector.cancel(&mut self.registry);
        }
        let removed = self.mutate(|registry| registry.remove_column(id));
        if removed {
            self.selector.column_removed(&self.registry, id);
            self.draft.remove(id);
            self.refresh();
        }
        removed
    }

    pub fn restore_removed_column(&mut self, id: &ColumnId) -> bool {
        self.mutate(|registry| registry.restore_removed_column(id))
    }

    pub fn discard_removed_column(&mut self, id: &ColumnId) -> bool {
        self.mutate(|registry| registry.discard_removed_column(id))
    }

    pub fn reorder_movable_columns(&mut self, ordered_ids: &[ColumnId]) {
        self.mutate(|registry| registry.reorder_movable_columns(ordered_ids))
    }

    // Selection

    pub fn attach_operation(
        &mut self,
        target: &ColumnId,
        operator: Operator,
    ) -> Result<bool, CalculationError> {
        let attached = self
            .selector
            .attach_operation(&mut self.registry, target, operator);
        self.refresh();
        attached
    }

    pub fn click_operand(
        &mut self,
        target: &ColumnId,
        operation_index: usize,
        operand_index: usize,
    ) -> bool {
        let changed =
            self.selector
                .click_operand(&mut self.registry, target, operation_index, operand_index);
        self.refresh();
        changed
    }

    pub fn rebind_operand(
        &mut self,
        target: &ColumnId,
        operation_index: usize,
        operand_index: usize,
    ) -> bool {
        let changed =
            self.selector
                .rebind_operand(&mut self.registry, target, operation_index, operand_index);
        self.refresh();
        changed
    }

    pub fn select_column(&mut self, source: &ColumnId) -> bool {
        let bound = self.selector.select_column(&mut self.registry, source);
        self.refresh();
        bound
    }

    pub fn cancel_selection(&mut self) -> bool {
        let cancelled = self.selector.cancel(&mut self.registry);
        self.refresh();
        cancelled
    }

    pub fn pointer_outside(&mut self) -> bool {
        let cancelled = self.selector.pointer_outside(&mut self.registry);
        self.refresh();
        cancelled
    }

    pub fn plan_operand_removal(
        &self,
        target: &ColumnId,
        operation_index: usize,
        operand_index: usize,
    ) -> Option<OperandRemoval> {
        self.selector
            .plan_operand_removal(&self.registry, target, operation_index, operand_index)
    }

    pub fn apply_operand_removal(&mut self, removal: &OperandRemoval) -> bool {
        let applied = self
            .selector
            .apply_operand_removal(&mut self.registry, removal);
        self.refresh();
        applied
    }

    // Serialization

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate(&self.registry)
    }

    pub fn payload(&self) -> TemplatePayload {
        serialize(&self.registry)
    }

    pub async fn submit<S>(
        &self,
        store: &S,
        editing_id: Option<i64>,
    ) -> Result<TemplateRecord, SubmitError>
    where
        S: TemplateStore + ?Sized,
    {
        submit_template(store, &self.registry, editing_id).await
    }

    /// Run a lifecycle operation and flash every column whose formula it changed.
    fn mutate<R>(&mut self, operation: impl FnOnce(&mut ColumnRegistry) -> R) -> R {
        let before: HashMap<ColumnId, Formula> = self
            .registry
            .columns()
            .iter()
            .map(|column| (column.id.clone(), column.formula.clone()))
            .collect();

        let result = operation(&mut self.registry);

        let empty = Formula::default();
        for column in self.registry.columns() {
            if before.get(&column.id).unwrap_or(&empty) != &column.formula {
                self.notifications.push(Notification::Flash {
                    column: column.id.clone(),
                    duration: self.flash_duration,
                });
            }
        }
        self.refresh();
        result
    }

    fn refresh(&mut self) {
        for event in self.selector.drain_events() {
            self.notifications.push(match event {
                SelectionEvent::Flash(column) => Notification::Flash {
                    column,
                    duration: self.flash_duration,
                },
                SelectionEvent::Highlight(columns) => Notification::Highlight(columns),
            });
        }
        evaluate_in_place(&self.registry, &mut self.draft);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryTemplateStore;

    fn flashes(notifications: &[Notification]) -> Vec<ColumnId> {
        notifications
            .iter()
            .filter_map(|notification| match notification {
                Notification::Flash { column, .. } => Some(column.clone()),
                Notification::Highlight(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_values_recompute_on_every_change() {
        let mut editor = TemplateEditor::new();
        let quantity = BaseKind::Quantity.column_id();
        let unit_cost = BaseKind::UnitCost.column_id();
        let total = BaseKind::Total.column_id();

        editor.set_value(&quantity, "4");
        editor.set_value(&unit_cost, "2,5");
        assert_eq!(editor.draft().get(&total), Some("10"));

        editor.remove_column(&quantity);
        assert_eq!(editor.draft().get(&quantity), None);
        assert_eq!(editor.draft().get(&total), Some("2.5"));
    }

    #[test]
    fn test_adding_quantity_flashes_total() {
        let mut editor = TemplateEditor::new().with_flash_duration(Duration::from_millis(250));
        let quantity = BaseKind::Quantity.column_id();
        let total = BaseKind::Total.column_id();
        editor.remove_column(&quantity);
        editor.drain_notifications();

        assert!(editor.add_base_column(BaseKind::Quantity));
        let notifications = editor.drain_notifications();
        assert_eq!(
            notifications,
            vec![Notification::Flash {
                column: total,
                duration: Duration::from_millis(250)
            }]
        );
    }

    #[test]
    fn test_selection_notifications() {
        let mut editor = TemplateEditor::new();
        let weight = editor.add_attribute_column();
        editor.answer_quantity_question(&weight, true);
        let unit_cost = BaseKind::UnitCost.column_id();

        assert!(editor.attach_operation(&unit_cost, Operator::Multiply).unwrap());
        let notifications = editor.drain_notifications();
        assert!(notifications.iter().any(|n| matches!(n, Notification::Highlight(_))));
        assert_eq!(flashes(&notifications), vec![unit_cost.clone()]);

        editor.select_column(&weight);
        editor.select_column(&BaseKind::Quantity.column_id());
        assert!(matches!(editor.selection(), SelectionState::Idle));

        editor.set_value(&weight, "3");
        editor.set_value(&BaseKind::Quantity.column_id(), "2");
        assert_eq!(editor.draft().get(&unit_cost), Some("6"));
        assert_eq!(editor.draft().get(&BaseKind::Total.column_id()), Some("12"));
    }

    #[test]
    fn test_removing_selection_target_goes_idle() {
        let mut editor = TemplateEditor::new();
        let weight = editor.add_attribute_column();
        editor.rename_column(&weight, "Weight");
        editor.answer_quantity_question(&weight, true);
        editor.attach_operation(&weight, Operator::Add).unwrap();
        assert!(editor.remove_column(&weight));
        assert!(matches!(editor.selection(), SelectionState::Idle));
        assert_eq!(editor.registry().removed_columns().len(), 1);
        assert!(editor.registry().removed_columns()[0].formula.is_empty());
    }

    #[test]
    fn test_cancel_after_removing_bound_source() {
        let mut editor = TemplateEditor::new();
        editor.set_title("Cement");
        let total = BaseKind::Total.column_id();
        let weight = editor.add_attribute_column();
        editor.rename_column(&weight, "Weight");
        editor.answer_quantity_question(&weight, true);
        editor.attach_operation(&total, Operator::Multiply).unwrap();
        assert!(editor.select_column(&weight));

        assert!(editor.rebind_operand(&total, 0, 1));
        assert!(editor.remove_column(&weight));
        assert!(editor.cancel_selection());

        let formula = &editor.registry().column(&total).unwrap().formula;
        assert!(!formula.references(&weight));
        assert_eq!(formula.describe(), "Quantity × Unit Cost");
        assert!(editor.validate().is_ok());

        let payload = editor.payload();
        let calculation = payload
            .base_calculations
            .iter()
            .find(|entry| entry.base_id == BaseKind::Total.id())
            .and_then(|entry| entry.calculation.as_ref())
            .unwrap();
        assert!(calculation
            .operations
            .iter()
            .all(|operation| operation.attribute_refs.is_none()));
    }

    #[tokio::test]
    async fn test_submit_and_load() {
        let store = InMemoryTemplateStore::new();
        let mut editor = TemplateEditor::new();
        editor.set_title("Cement");
        let record = editor.submit(&store, None).await.unwrap();

        let mut other = TemplateEditor::new();
        other.set_value(&BaseKind::Quantity.column_id(), "1");
        other.load(&record);
        assert_eq!(other.registry().title(), "Cement");
        assert!(other.draft().is_empty());
        assert_eq!(other.payload(), editor.payload());
    }
}
