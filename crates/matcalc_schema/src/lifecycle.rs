//! Column Lifecycle
//!
//! Adding, answering, renaming, removing, restoring and reordering columns.
//!
//! Every operation here is total: unknown ids and requests that do not apply
//! to the target column are silent no-ops. The boolean results tell the
//! caller whether the registry changed.

use crate::column::{BaseKind, Column, Formula, Operand, Operation, Operator, TOTAL_ORDER};
use crate::registry::ColumnRegistry;
use matcalc_ids::ColumnId;
use std::collections::HashMap;
use tracing::debug;

impl ColumnRegistry {
    /// Insert the anchored column for `kind` at its canonical slot.
    ///
    /// Adding Quantity also wires Total: a Total without a formula becomes
    /// `Quantity × Unit Cost`; a Total with a formula that does not mention
    /// Quantity gets it appended to its first operation.
    pub fn add_base_column(&mut self, kind: BaseKind) -> bool {
        if self.base_column(kind).is_some() {
            return false;
        }

        let column = Column::base(kind);
        debug!(column = %column.id, "adding base column");
        self.insert_column(column);

        if kind == BaseKind::Quantity {
            self.wire_total_to_quantity();
        }
        self.repin_anchors();
        true
    }

    fn wire_total_to_quantity(&mut self) {
        let Some(quantity) = self.base_column(BaseKind::Quantity).cloned() else {
            return;
        };
        let unit_cost = self
            .base_column(BaseKind::UnitCost)
            .cloned()
            .unwrap_or_else(|| Column::base(BaseKind::UnitCost));

        let Some(total) = self.base_column_mut(BaseKind::Total) else {
            return;
        };
        if total.formula.references(&quantity.id) {
            return;
        }

        match total.formula.operations.first_mut() {
            Some(first) => first.operands.push(Operand::bound_to(&quantity)),
            None => {
                total.formula = Formula::new(vec![Operation::new(
                    Operator::Multiply,
                    vec![Operand::bound_to(&quantity), Operand::bound_to(&unit_cost)],
                )]);
            }
        }
        debug!("total wired to quantity");
    }

    /// Append a new attribute column with an open quantity question.
    ///
    /// It is placed after every movable column; Unit Cost is pushed behind it
    /// and Total keeps the terminal order.
    pub fn add_attribute_column(&mut self) -> ColumnId {
        let last_before_cost = self
            .columns()
            .iter()
            .filter(|column| {
                !matches!(
                    column.base_kind(),
                    Some(BaseKind::UnitCost) | Some(BaseKind::Total)
                )
            })
            .map(|column| column.order)
            .max()
            .unwrap_or(0);
        let order = last_before_cost + 1;

        let index = self.allocate_attribute_index();
        let column = Column::attribute(index, order);
        let id = column.id.clone();
        debug!(column = %id, order, "adding attribute column");

        if let Some(unit_cost) = self.base_column_mut(BaseKind::UnitCost) {
            if unit_cost.order <= order {
                unit_cost.order = order + 1;
            }
        }
        if let Some(total) = self.base_column_mut(BaseKind::Total) {
            total.order = TOTAL_ORDER;
        }
        self.insert_column(column);
        id
    }

    /// Record the answer to "is this column a quantity?".
    pub fn answer_quantity_question(&mut self, id: &ColumnId, is_quantity: bool) -> bool {
        let Some(column) = self.column_mut(id) else {
            return false;
        };
        if !column.is_attribute() {
            return false;
        }
        column.is_quantity = is_quantity;
        column.quantity = is_quantity.into();
        debug!(column = %id, is_quantity, "quantity question answered");
        true
    }

    /// Change an editable column's title and refresh operands that show it.
    pub fn rename_column(&mut self, id: &ColumnId, title: impl Into<String>) -> bool {
        let Some(column) = self.column_mut(id) else {
            return false;
        };
        if !column.is_editable() {
            return false;
        }
        column.title = title.into();
        let display = column.display_title();

        for other in self.columns_mut() {
            for operation in &mut other.formula.operations {
                for operand in &mut operation.operands {
                    if operand.bound.as_ref() == Some(id) {
                        operand.title = display.clone();
                    }
                }
            }
        }
        true
    }

    /// Remove a column from the template.
    ///
    /// Attribute columns with a title or a formula move to the removed basket
    /// so they can be restored; blank ones are dropped. Optional anchors are
    /// dropped (re-add them with [`ColumnRegistry::add_base_column`]).
    /// Mandatory anchors cannot be removed. References to the removed column
    /// are purged from every other formula.
    pub fn remove_column(&mut self, id: &ColumnId) -> bool {
        if !self.column(id).is_some_and(Column::is_removable) {
            return false;
        }
        let Some(column) = self.take_column(id) else {
            return false;
        };

        for other in self.columns_mut() {
            other.formula.remove_references(id);
        }

        let keep = column.is_attribute()
            && (!column.title.trim().is_empty() || !column.formula.is_empty());
        debug!(column = %id, basket = keep, "column removed");
        if keep {
            self.push_removed(column);
        }
        true
    }

    /// Put a removed attribute column back exactly as it was. Unit Cost moves
    /// behind it if a reorder since the removal left it in front.
    pub fn restore_removed_column(&mut self, id: &ColumnId) -> bool {
        let Some(column) = self.take_removed(id) else {
            return false;
        };
        if self.contains(id) {
            return false;
        }
        debug!(column = %id, "column restored");
        self.insert_column(column);
        self.repin_anchors();
        true
    }

    /// Permanently drop a removed column. Its attribute index is not reused.
    pub fn discard_removed_column(&mut self, id: &ColumnId) -> bool {
        let discarded = self.take_removed(id).is_some();
        if discarded {
            debug!(column = %id, "removed column discarded");
        }
        discarded
    }

    /// Assign consecutive orders to movable columns.
    ///
    /// Detail keeps order 1. `ordered_ids` come next in the given order;
    /// anchors, unknown ids and duplicates in it are ignored. Movable columns
    /// not listed follow in their previous relative order. Unit Cost takes the
    /// next integer and Total the terminal order.
    pub fn reorder_movable_columns(&mut self, ordered_ids: &[ColumnId]) {
        let mut assigned: HashMap<ColumnId, u32> = HashMap::new();
        let mut cursor = BaseKind::Detail.default_order() + 1;

        for id in ordered_ids {
            let movable = self.column(id).is_some_and(Column::is_movable);
            if movable && !assigned.contains_key(id) {
                assigned.insert(id.clone(), cursor);
                cursor += 1;
            }
        }

        let mut rest: Vec<(u32, ColumnId)> = self
            .columns()
            .iter()
            .filter(|column| column.is_movable() && !assigned.contains_key(&column.id))
            .map(|column| (column.order, column.id.clone()))
            .collect();
        rest.sort_by_key(|(order, _)| *order);
        for (_, id) in rest {
            assigned.insert(id, cursor);
            cursor += 1;
        }

        for column in self.columns_mut() {
            match column.base_kind() {
                Some(BaseKind::Detail) => column.order = BaseKind::Detail.default_order(),
                Some(BaseKind::UnitCost) => column.order = cursor,
                Some(BaseKind::Total) => column.order = TOTAL_ORDER,
                _ => {
                    if let Some(order) = assigned.get(&column.id) {
                        column.order = *order;
                    }
                }
            }
        }
        debug!(columns = assigned.len(), "movable columns reordered");
        self.normalize();
    }

    /// Keep Unit Cost behind every movable column and Total at the end.
    pub(crate) fn repin_anchors(&mut self) {
        let last_movable = self
            .columns()
            .iter()
            .filter(|column| column.is_movable())
            .map(|column| column.order)
            .max()
            .unwrap_or(0);
        if let Some(unit_cost) = self.base_column_mut(BaseKind::UnitCost) {
            if unit_cost.order <= last_movable {
                unit_cost.order = last_movable + 1;
            }
        }
        if let Some(total) = self.base_column_mut(BaseKind::Total) {
            total.order = TOTAL_ORDER;
        }
        self.normalize();
    }
}
