//! Template column model
//!
//! A template is an ordered set of columns. Five of them are *base* columns
//! with a fixed role (Detail, Quantity, Unit, Unit Cost, Total); the rest are
//! user-defined *attribute* columns. Any column may carry a [`Formula`], an
//! ordered chain of arithmetic [`Operation`]s over other columns.

use matcalc_ids::{ColumnId, OperandId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order value reserved for the Total column. Always sorts last.
pub const TOTAL_ORDER: u32 = 999;

/// Placeholder shown for operands that are not bound yet.
pub const UNBOUND_TITLE: &str = "---";

const ATTRIBUTE_FALLBACK_TITLE: &str = "Column";

/// The five positionally-anchored base column roles.
///
/// Serialized as the stable integer the persistence backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BaseKind {
    Detail,
    Quantity,
    Unit,
    UnitCost,
    Total,
}

impl BaseKind {
    pub const ALL: [BaseKind; 5] = [
        BaseKind::Detail,
        BaseKind::Quantity,
        BaseKind::Unit,
        BaseKind::UnitCost,
        BaseKind::Total,
    ];

    /// Stable integer used in payloads and column ids.
    pub fn id(self) -> u8 {
        match self {
            BaseKind::Detail => 1,
            BaseKind::Quantity => 2,
            BaseKind::Unit => 3,
            BaseKind::UnitCost => 4,
            BaseKind::Total => 5,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        BaseKind::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn label(self) -> &'static str {
        match self {
            BaseKind::Detail => "Detail",
            BaseKind::Quantity => "Quantity",
            BaseKind::Unit => "Unit",
            BaseKind::UnitCost => "Unit Cost",
            BaseKind::Total => "Total",
        }
    }

    /// Canonical order slot used when the column is (re)inserted.
    pub fn default_order(self) -> u32 {
        match self {
            BaseKind::Detail => 1,
            BaseKind::Quantity => 2,
            BaseKind::Unit => 3,
            BaseKind::UnitCost => 4,
            BaseKind::Total => TOTAL_ORDER,
        }
    }

    /// Optional anchors may be absent from a template.
    pub fn is_optional(self) -> bool {
        matches!(self, BaseKind::Quantity | BaseKind::Unit)
    }

    /// Pinned anchors never take part in user reordering.
    pub fn is_pinned(self) -> bool {
        matches!(self, BaseKind::Detail | BaseKind::UnitCost | BaseKind::Total)
    }

    pub fn column_id(self) -> ColumnId {
        ColumnId::base(self.id())
    }
}

impl From<BaseKind> for u8 {
    fn from(kind: BaseKind) -> Self {
        kind.id()
    }
}

impl TryFrom<u8> for BaseKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        BaseKind::from_id(value).ok_or_else(|| format!("unknown base column id: {}", value))
    }
}

impl FromStr for BaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "detail" | "1" => Ok(BaseKind::Detail),
            "quantity" | "2" => Ok(BaseKind::Quantity),
            "unit" | "3" => Ok(BaseKind::Unit),
            "unitcost" | "4" => Ok(BaseKind::UnitCost),
            "total" | "5" => Ok(BaseKind::Total),
            _ => Err(format!("unknown base column: '{}'", s)),
        }
    }
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Column family tag, as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColumnKind {
    #[default]
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "atribute", alias = "attribute")]
    Attribute,
}

/// Typed reference to a column, carried next to its opaque [`ColumnId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ColumnRef {
    Base(BaseKind),
    Attribute(u32),
}

impl ColumnRef {
    pub fn kind(self) -> ColumnKind {
        match self {
            ColumnRef::Base(_) => ColumnKind::Base,
            ColumnRef::Attribute(_) => ColumnKind::Attribute,
        }
    }

    pub fn column_id(self) -> ColumnId {
        match self {
            ColumnRef::Base(kind) => kind.column_id(),
            ColumnRef::Attribute(index) => ColumnId::attribute(index),
        }
    }
}

/// Answer to "is this column a quantity?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityState {
    #[default]
    Undecided,
    Yes,
    No,
}

impl QuantityState {
    pub fn is_decided(self) -> bool {
        !matches!(self, QuantityState::Undecided)
    }
}

impl From<bool> for QuantityState {
    fn from(is_quantity: bool) -> Self {
        if is_quantity {
            QuantityState::Yes
        } else {
            QuantityState::No
        }
    }
}

/// Arithmetic operator of one [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "multiplicacion", alias = "multiply")]
    Multiply,
    #[serde(rename = "division", alias = "divide")]
    Divide,
    #[serde(rename = "suma", alias = "add")]
    Add,
    #[serde(rename = "resta", alias = "subtract")]
    Subtract,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Multiply => "×",
            Operator::Divide => "/",
            Operator::Add => "+",
            Operator::Subtract => "-",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Operator::Multiply => "multiplication",
            Operator::Divide => "division",
            Operator::Add => "addition",
            Operator::Subtract => "subtraction",
        }
    }

    /// Value the running result starts from when this operator seeds a chain.
    pub fn identity(self) -> f64 {
        match self {
            Operator::Multiply | Operator::Divide => 1.0,
            Operator::Add | Operator::Subtract => 0.0,
        }
    }

    /// Combine `acc` with `value`. Division by zero yields `None`.
    pub fn apply(self, acc: f64, value: f64) -> Option<f64> {
        match self {
            Operator::Multiply => Some(acc * value),
            Operator::Divide if value == 0.0 => None,
            Operator::Divide => Some(acc / value),
            Operator::Add => Some(acc + value),
            Operator::Subtract => Some(acc - value),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One formula input: either bound to a source column or a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    pub id: OperandId,
    /// `None` marks a placeholder awaiting selection.
    pub bound: Option<ColumnId>,
    pub title: String,
    pub kind: ColumnKind,
}

impl Operand {
    /// An unbound operand.
    pub fn placeholder() -> Self {
        Self {
            id: OperandId::new(),
            bound: None,
            title: String::new(),
            kind: ColumnKind::Base,
        }
    }

    /// An operand already bound to `column`.
    pub fn bound_to(column: &Column) -> Self {
        let mut operand = Self::placeholder();
        operand.bind(column);
        operand
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn bind(&mut self, column: &Column) {
        self.bound = Some(column.id.clone());
        self.title = column.display_title();
        self.kind = column.kind();
    }

    pub fn unbind(&mut self) {
        self.bound = None;
        self.title.clear();
    }

    fn display_title(&self) -> &str {
        if self.title.is_empty() {
            UNBOUND_TITLE
        } else {
            &self.title
        }
    }
}

/// An operator applied to the product of its operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operator: Operator,
    pub operands: Vec<Operand>,
}

impl Operation {
    pub fn new(operator: Operator, operands: Vec<Operand>) -> Self {
        Self { operator, operands }
    }

    /// A new operation seeded with `count` placeholders.
    pub fn with_placeholders(operator: Operator, count: usize) -> Self {
        Self::new(operator, (0..count).map(|_| Operand::placeholder()).collect())
    }

    pub fn has_pending(&self) -> bool {
        self.operands.iter().any(|operand| !operand.is_bound())
    }
}

/// Ordered chain of operations producing a column's derived value.
///
/// An empty formula means "not computed".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Formula {
    pub operations: Vec<Operation>,
}

impl Formula {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// True if any operand is still a placeholder.
    pub fn has_pending(&self) -> bool {
        self.operations.iter().any(Operation::has_pending)
    }

    /// Non-empty and every operand bound.
    pub fn is_complete(&self) -> bool {
        !self.is_empty() && !self.has_pending()
    }

    pub fn has_resolved_operands(&self) -> bool {
        self.bound_columns().next().is_some()
    }

    pub fn bound_columns(&self) -> impl Iterator<Item = &ColumnId> {
        self.operations
            .iter()
            .flat_map(|operation| operation.operands.iter())
            .filter_map(|operand| operand.bound.as_ref())
    }

    pub fn references(&self, column_id: &ColumnId) -> bool {
        self.bound_columns().any(|bound| bound == column_id)
    }

    pub fn operand(&self, operation_index: usize, operand_index: usize) -> Option<&Operand> {
        self.operations
            .get(operation_index)
            .and_then(|operation| operation.operands.get(operand_index))
    }

    pub fn operand_mut(
        &mut self,
        operation_index: usize,
        operand_index: usize,
    ) -> Option<&mut Operand> {
        self.operations
            .get_mut(operation_index)
            .and_then(|operation| operation.operands.get_mut(operand_index))
    }

    /// First unbound operand at or after the given slot, scanning forward
    /// through the current operation and then the following ones.
    pub fn next_pending_from(
        &self,
        operation_index: usize,
        operand_index: usize,
    ) -> Option<(usize, usize)> {
        self.operations
            .iter()
            .enumerate()
            .skip(operation_index)
            .find_map(|(op_idx, operation)| {
                let start = if op_idx == operation_index { operand_index } else { 0 };
                operation
                    .operands
                    .iter()
                    .enumerate()
                    .skip(start)
                    .find(|(_, operand)| !operand.is_bound())
                    .map(|(idx, _)| (op_idx, idx))
            })
    }

    /// Drop placeholders, then any operation left without operands.
    pub fn prune_unbound(&mut self) {
        for operation in &mut self.operations {
            operation.operands.retain(Operand::is_bound);
        }
        self.operations.retain(|operation| !operation.operands.is_empty());
    }

    /// Drop every operand bound to `column_id`. Returns true if anything changed.
    pub fn remove_references(&mut self, column_id: &ColumnId) -> bool {
        if !self.references(column_id) {
            return false;
        }
        for operation in &mut self.operations {
            operation
                .operands
                .retain(|operand| operand.bound.as_ref() != Some(column_id));
        }
        self.operations.retain(|operation| !operation.operands.is_empty());
        true
    }

    /// Human-readable rendering, e.g. `Quantity × Unit Cost / ---`.
    pub fn describe(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for operation in &self.operations {
            for operand in &operation.operands {
                if !parts.is_empty() {
                    parts.push(operation.operator.symbol());
                }
                parts.push(operand.display_title());
            }
        }
        parts.join(" ")
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub reference: ColumnRef,
    pub title: String,
    pub order: u32,
    pub is_quantity: bool,
    pub quantity: QuantityState,
    #[serde(default)]
    pub formula: Formula,
}

impl Column {
    /// The anchored column for `kind`, at its canonical slot.
    pub fn base(kind: BaseKind) -> Self {
        Self {
            id: kind.column_id(),
            reference: ColumnRef::Base(kind),
            title: kind.label().to_string(),
            order: kind.default_order(),
            is_quantity: kind == BaseKind::Quantity,
            quantity: QuantityState::from(kind == BaseKind::Quantity),
            formula: Formula::default(),
        }
    }

    /// A fresh attribute column whose quantity question is still open.
    pub fn attribute(index: u32, order: u32) -> Self {
        Self {
            id: ColumnId::attribute(index),
            reference: ColumnRef::Attribute(index),
            title: String::new(),
            order,
            is_quantity: false,
            quantity: QuantityState::Undecided,
            formula: Formula::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_quantity(mut self, is_quantity: bool) -> Self {
        self.is_quantity = is_quantity;
        self.quantity = QuantityState::from(is_quantity);
        self
    }

    pub fn with_formula(mut self, formula: Formula) -> Self {
        self.formula = formula;
        self
    }

    pub fn kind(&self) -> ColumnKind {
        self.reference.kind()
    }

    pub fn base_kind(&self) -> Option<BaseKind> {
        match self.reference {
            ColumnRef::Base(kind) => Some(kind),
            ColumnRef::Attribute(_) => None,
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self.reference, ColumnRef::Base(_))
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.reference, ColumnRef::Attribute(_))
    }

    /// Detail, Unit Cost and Total keep a fixed position.
    pub fn is_pinned(&self) -> bool {
        self.base_kind().is_some_and(BaseKind::is_pinned)
    }

    pub fn is_movable(&self) -> bool {
        !self.is_pinned()
    }

    /// Mandatory anchors stay for the template's whole life.
    pub fn is_removable(&self) -> bool {
        self.base_kind().map_or(true, BaseKind::is_optional)
    }

    /// Title is user-editable unless the column is a mandatory anchor.
    pub fn is_editable(&self) -> bool {
        match self.base_kind() {
            Some(kind) => kind.is_optional(),
            None => true,
        }
    }

    pub fn has_pending_question(&self) -> bool {
        self.is_attribute() && !self.quantity.is_decided()
    }

    /// Decided and answered "yes".
    pub fn is_decided_quantity(&self) -> bool {
        self.quantity == QuantityState::Yes && self.is_quantity
    }

    pub fn display_title(&self) -> String {
        let trimmed = self.title.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
        match self.base_kind() {
            Some(kind) => kind.label().to_string(),
            None => ATTRIBUTE_FALLBACK_TITLE.to_string(),
        }
    }

    /// Whether a new operation may be attached to this column.
    pub fn supports_calculation(&self) -> bool {
        match self.base_kind() {
            Some(BaseKind::Total) | Some(BaseKind::UnitCost) => true,
            Some(BaseKind::Quantity) => self.is_decided_quantity(),
            Some(BaseKind::Detail) | Some(BaseKind::Unit) => false,
            None => !self.formula.is_empty() || self.is_decided_quantity(),
        }
    }

    /// An attribute whose quantity question must be answered before it can
    /// carry a calculation.
    pub fn blocks_on_quantity_question(&self) -> bool {
        self.has_pending_question() && self.formula.is_empty()
    }

    /// Whether this column may be picked as an operand source.
    pub fn is_selectable_for_calculation(&self) -> bool {
        if self.formula.is_complete() {
            return true;
        }
        match self.base_kind() {
            Some(BaseKind::UnitCost) | Some(BaseKind::Total) => true,
            Some(BaseKind::Quantity) => self.is_decided_quantity(),
            Some(BaseKind::Detail) | Some(BaseKind::Unit) => false,
            None => self.is_decided_quantity(),
        }
    }
}
