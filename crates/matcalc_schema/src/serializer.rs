//! Template validation and payload serialization.
//!
//! The payload is index-addressed: base columns are referenced by their
//! stable kind integer and attribute columns by their attribute index. Wire
//! keys follow the persistence backend's naming.

use crate::column::{BaseKind, Column, ColumnKind, ColumnRef, Formula, Operator};
use crate::registry::ColumnRegistry;
use matcalc_ids::{ColumnId, ColumnIdKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Why a template cannot be submitted yet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("template title is required")]
    EmptyTitle,

    #[error("answer whether '{column}' is a quantity")]
    QuantityQuestionPending { column: String },

    #[error("calculation of '{column}' is incomplete")]
    IncompleteCalculation { column: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePayload {
    #[serde(rename = "titulo")]
    pub title: String,
    /// Optional anchors currently present.
    #[serde(rename = "headers_base_active")]
    pub active_base: Vec<u8>,
    #[serde(rename = "headers_base_calculations")]
    pub base_calculations: Vec<BaseCalculationPayload>,
    #[serde(rename = "headers_atributes")]
    pub attributes: Vec<AttributePayload>,
    #[serde(rename = "order_headers")]
    pub order: Vec<OrderEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseCalculationPayload {
    #[serde(rename = "id_header_base")]
    pub base_id: u8,
    #[serde(rename = "titulo")]
    pub title: String,
    pub order: u32,
    #[serde(rename = "calculo", default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<CalculationPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePayload {
    #[serde(rename = "id_header_atribute", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "isCantidad")]
    pub is_quantity: bool,
    pub order: u32,
    #[serde(rename = "calculo", default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<CalculationPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationPayload {
    #[serde(rename = "activo")]
    pub active: bool,
    #[serde(rename = "isMultiple")]
    pub is_multiple: bool,
    #[serde(rename = "operaciones")]
    pub operations: Vec<OperationPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPayload {
    #[serde(rename = "tipo")]
    pub operator: Operator,
    #[serde(rename = "headers_base", default, skip_serializing_if = "Option::is_none")]
    pub base_refs: Option<Vec<u8>>,
    #[serde(rename = "headers_atributes", default, skip_serializing_if = "Option::is_none")]
    pub attribute_refs: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    pub id: u32,
    pub order: u32,
}

/// Check that the template is ready to submit. Reports the first problem.
pub fn validate(registry: &ColumnRegistry) -> Result<(), ValidationError> {
    if registry.title().trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if let Some(column) = registry.columns().iter().find(|c| c.has_pending_question()) {
        return Err(ValidationError::QuantityQuestionPending {
            column: column.display_title(),
        });
    }
    if let Some(column) = registry.columns().iter().find(|c| c.formula.has_pending()) {
        return Err(ValidationError::IncompleteCalculation {
            column: column.display_title(),
        });
    }
    Ok(())
}

/// Convert the registry into its persistence payload. Does not validate.
pub fn serialize(registry: &ColumnRegistry) -> TemplatePayload {
    let active_base = BaseKind::ALL
        .into_iter()
        .filter(|kind| kind.is_optional() && registry.base_column(*kind).is_some())
        .map(BaseKind::id)
        .collect();

    let base_calculations = registry
        .base_columns()
        .filter(|column| !column.formula.is_empty())
        .filter_map(|column| {
            Some(BaseCalculationPayload {
                base_id: column.base_kind()?.id(),
                title: column.display_title(),
                order: column.order,
                calculation: calculation_payload(registry, &column.formula),
            })
        })
        .collect();

    let attributes = registry
        .columns()
        .iter()
        .filter(|column| column.is_attribute())
        .map(|column| AttributePayload {
            id: Some(reference_index(column)),
            title: column.display_title(),
            is_quantity: column.is_quantity,
            order: column.order,
            calculation: calculation_payload(registry, &column.formula),
        })
        .collect();

    let order = registry
        .columns()
        .iter()
        .map(|column| OrderEntry {
            kind: column.kind(),
            id: reference_index(column),
            order: column.order,
        })
        .collect();

    let payload = TemplatePayload {
        title: registry.title().trim().to_string(),
        active_base,
        base_calculations,
        attributes,
        order,
    };
    info!(
        title = %payload.title,
        attributes = payload.attributes.len(),
        calculations = payload.base_calculations.len(),
        "template serialized"
    );
    payload
}

fn reference_index(column: &Column) -> u32 {
    match column.reference {
        ColumnRef::Base(kind) => u32::from(kind.id()),
        ColumnRef::Attribute(index) => index,
    }
}

/// Resolve a bound column id to its typed reference, falling back to the id
/// pattern for columns no longer in the registry.
fn resolve_reference(registry: &ColumnRegistry, id: &ColumnId) -> Option<ColumnRef> {
    if let Some(column) = registry.column(id) {
        return Some(column.reference);
    }
    match id.kind()? {
        ColumnIdKind::Base(kind) => BaseKind::from_id(kind).map(ColumnRef::Base),
        ColumnIdKind::Attribute(index) => Some(ColumnRef::Attribute(index)),
    }
}

fn calculation_payload(registry: &ColumnRegistry, formula: &Formula) -> Option<CalculationPayload> {
    let operations: Vec<OperationPayload> = formula
        .operations
        .iter()
        .filter_map(|operation| {
            let mut base_refs: Vec<u8> = Vec::new();
            let mut attribute_refs: Vec<u32> = Vec::new();
            for id in operation.operands.iter().filter_map(|o| o.bound.as_ref()) {
                match resolve_reference(registry, id) {
                    Some(ColumnRef::Base(kind)) if !base_refs.contains(&kind.id()) => {
                        base_refs.push(kind.id())
                    }
                    Some(ColumnRef::Attribute(index)) if !attribute_refs.contains(&index) => {
                        attribute_refs.push(index)
                    }
                    _ => {}
                }
            }
            if base_refs.is_empty() && attribute_refs.is_empty() {
                return None;
            }
            Some(OperationPayload {
                operator: operation.operator,
                base_refs: (!base_refs.is_empty()).then_some(base_refs),
                attribute_refs: (!attribute_refs.is_empty()).then_some(attribute_refs),
            })
        })
        .collect();

    if operations.is_empty() {
        return None;
    }
    Some(CalculationPayload {
        active: true,
        is_multiple: operations.len() > 1,
        operations,
    })
}
