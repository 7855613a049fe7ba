//! Column registry
//!
//! The owned, ordered set of column definitions for one template, plus the
//! basket of soft-removed attribute columns. Callers read through the public
//! accessors; every mutation goes through the lifecycle and selection
//! operations.

use crate::column::{BaseKind, Column, ColumnRef, Formula, Operand, Operation, Operator};
use matcalc_ids::ColumnId;
use serde::{Deserialize, Serialize};

/// Ordered arena of columns for the template being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRegistry {
    title: String,
    columns: Vec<Column>,
    removed: Vec<Column>,
    /// Next attribute index to hand out. Never decreases.
    next_attribute: u32,
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            title: String::new(),
            columns: Vec::new(),
            removed: Vec::new(),
            next_attribute: 1,
        }
    }

    /// The starting layout for a new template: every base column present and
    /// Total pre-wired to `Quantity × Unit Cost`.
    pub fn with_default_columns() -> Self {
        let quantity = Column::base(BaseKind::Quantity).with_order(3);
        let unit_cost = Column::base(BaseKind::UnitCost);
        let total = Column::base(BaseKind::Total).with_formula(Formula::new(vec![Operation::new(
            Operator::Multiply,
            vec![Operand::bound_to(&quantity), Operand::bound_to(&unit_cost)],
        )]));

        let mut registry = Self::new();
        registry.columns = vec![
            Column::base(BaseKind::Detail),
            Column::base(BaseKind::Unit).with_order(2),
            quantity,
            unit_cost,
            total,
        ];
        registry.normalize();
        registry
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Active columns in display order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|column| &column.id == id)
    }

    pub fn contains(&self, id: &ColumnId) -> bool {
        self.column(id).is_some()
    }

    pub fn base_column(&self, kind: BaseKind) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.base_kind() == Some(kind))
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.is_attribute())
    }

    pub fn base_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.is_base())
    }

    /// Soft-removed attribute columns, oldest first.
    pub fn removed_columns(&self) -> &[Column] {
        &self.removed
    }

    /// Optional anchors that can currently be added back.
    pub fn available_base_kinds(&self) -> Vec<BaseKind> {
        BaseKind::ALL
            .into_iter()
            .filter(|kind| kind.is_optional() && self.base_column(*kind).is_none())
            .collect()
    }

    pub fn next_attribute_index(&self) -> u32 {
        self.next_attribute
    }

    pub(crate) fn column_mut(&mut self, id: &ColumnId) -> Option<&mut Column> {
        self.columns.iter_mut().find(|column| &column.id == id)
    }

    pub(crate) fn base_column_mut(&mut self, kind: BaseKind) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|column| column.base_kind() == Some(kind))
    }

    pub(crate) fn columns_mut(&mut self) -> impl Iterator<Item = &mut Column> {
        self.columns.iter_mut()
    }

    pub(crate) fn allocate_attribute_index(&mut self) -> u32 {
        let index = self.next_attribute;
        self.next_attribute += 1;
        index
    }

    /// Insert a column, keeping the attribute counter ahead of every index seen.
    pub(crate) fn insert_column(&mut self, column: Column) {
        if let ColumnRef::Attribute(index) = column.reference {
            self.next_attribute = self.next_attribute.max(index.saturating_add(1));
        }
        self.columns.push(column);
        self.normalize();
    }

    pub(crate) fn take_column(&mut self, id: &ColumnId) -> Option<Column> {
        let position = self.columns.iter().position(|column| &column.id == id)?;
        Some(self.columns.remove(position))
    }

    /// Swap in a full column definition with the same id. Returns false if absent.
    pub(crate) fn replace_column(&mut self, column: Column) -> bool {
        match self.column_mut(&column.id) {
            Some(slot) => {
                *slot = column;
                self.normalize();
                true
            }
            None => false,
        }
    }

    pub(crate) fn push_removed(&mut self, column: Column) {
        self.removed.retain(|existing| existing.id != column.id);
        self.removed.push(column);
    }

    pub(crate) fn take_removed(&mut self, id: &ColumnId) -> Option<Column> {
        let position = self.removed.iter().position(|column| &column.id == id)?;
        Some(self.removed.remove(position))
    }

    /// Stable sort by order; Total always sorts last.
    pub(crate) fn normalize(&mut self) {
        self.columns
            .sort_by_key(|column| (column.base_kind() == Some(BaseKind::Total), column.order));
    }
}
