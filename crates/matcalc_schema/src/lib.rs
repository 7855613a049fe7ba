//! Material Type Templates
//!
//! Schema and formula engine for material-type templates: an ordered set of
//! columns (five anchored base columns plus user-defined attributes), each of
//! which may derive its value from other columns through a formula.
//!
//! # Components
//!
//! - [`ColumnRegistry`]: the owned column arena, mutated through the
//!   lifecycle operations in [`lifecycle`]
//! - [`OperandSelector`]: the `Idle | Selecting` machine that binds formula
//!   placeholders to source columns
//! - [`evaluator`]: two-phase recomputation of a [`RowDraft`]
//! - [`serializer`]: validation and the index-addressed persistence payload
//! - [`persistence`]: the async [`TemplateStore`] contract and two stores
//! - [`TemplateEditor`]: one editing session tying the above together
//!
//! # Example
//!
//! ```
//! use matcalc_schema::{BaseKind, TemplateEditor};
//!
//! let mut editor = TemplateEditor::new();
//! editor.set_title("Cement");
//! editor.set_value(&BaseKind::Quantity.column_id(), "4");
//! editor.set_value(&BaseKind::UnitCost.column_id(), "2,5");
//! assert_eq!(editor.draft().get(&BaseKind::Total.column_id()), Some("10"));
//! assert!(editor.validate().is_ok());
//! ```

pub mod column;
pub mod editor;
pub mod evaluator;
pub mod hydrate;
pub mod lifecycle;
pub mod persistence;
pub mod record;
pub mod registry;
pub mod selection;
pub mod serializer;

pub use column::{
    BaseKind, Column, ColumnKind, ColumnRef, Formula, Operand, Operation, Operator,
    QuantityState, TOTAL_ORDER, UNBOUND_TITLE,
};
pub use editor::{Notification, TemplateEditor, DEFAULT_FLASH_DURATION};
pub use evaluator::{evaluate, evaluate_formula, format_number, parse_numeric, RowDraft};
pub use persistence::{
    submit_template, InMemoryTemplateStore, JsonFileTemplateStore, StoreError, SubmitError,
    TemplateStore,
};
pub use record::{AttributeRecord, BaseHeaderRecord, TemplateRecord};
pub use registry::ColumnRegistry;
pub use selection::{
    CalculationError, OperandRemoval, OperandSelector, Selection, SelectionEvent, SelectionState,
};
pub use serializer::{
    serialize, validate, AttributePayload, BaseCalculationPayload, CalculationPayload,
    OperationPayload, OrderEntry, TemplatePayload, ValidationError,
};

pub use matcalc_ids::ColumnId;
