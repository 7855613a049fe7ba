//! Rebuild an editable registry from a persisted template.

use crate::column::{BaseKind, Column, ColumnKind, Formula, Operand, Operation, TOTAL_ORDER};
use crate::record::TemplateRecord;
use crate::registry::ColumnRegistry;
use crate::serializer::CalculationPayload;
use matcalc_ids::ColumnId;
use tracing::{debug, warn};

impl ColumnRegistry {
    /// Hydrate a registry from its stored record.
    ///
    /// Orders are taken from the flattened order list, then from the header
    /// itself, then from position. Mandatory anchors are always present;
    /// inactive optional anchors are left out. Unit Cost is moved behind any
    /// movable column stored after it. Calculation references that no longer
    /// resolve are dropped.
    pub fn from_record(record: &TemplateRecord) -> Self {
        let mut registry = ColumnRegistry::new();
        registry.set_title(record.title.clone());

        let listed_order = |kind: ColumnKind, id: u32| {
            record
                .order
                .iter()
                .find(|entry| entry.kind == kind && entry.id == id)
                .map(|entry| entry.order)
        };

        for kind in BaseKind::ALL {
            let position = record
                .base_headers
                .iter()
                .position(|header| header.base_id == kind.id());
            let header = position.map(|index| &record.base_headers[index]);
            if kind.is_optional() && !header.is_some_and(|header| header.active) {
                continue;
            }

            let order = if kind == BaseKind::Total {
                TOTAL_ORDER
            } else {
                listed_order(ColumnKind::Base, u32::from(kind.id()))
                    .or_else(|| header.and_then(|header| header.order))
                    .or_else(|| position.map(|index| index as u32 + 1))
                    .unwrap_or_else(|| kind.default_order())
            };
            let mut column = Column::base(kind).with_order(order);
            if let Some(header) = header.filter(|_| kind.is_optional()) {
                if !header.title.trim().is_empty() {
                    column.title = header.title.clone();
                }
            }
            registry.insert_column(column);
        }

        let base_count = registry.columns().len() as u32;
        for (position, attribute) in record.attributes.iter().enumerate() {
            let order = listed_order(ColumnKind::Attribute, attribute.id)
                .or(attribute.order)
                .unwrap_or(base_count + position as u32 + 1);
            let column = Column::attribute(attribute.id, order)
                .with_title(attribute.title.clone())
                .with_quantity(attribute.is_quantity);
            registry.insert_column(column);
        }

        let mut formulas: Vec<(ColumnId, Formula)> = Vec::new();
        for header in &record.base_headers {
            let Some(kind) = BaseKind::from_id(header.base_id) else {
                warn!(base_id = header.base_id, "unknown base header skipped");
                continue;
            };
            if let Some(calculation) = &header.calculation {
                formulas.push((kind.column_id(), formula_from_payload(&registry, calculation)));
            }
        }
        for attribute in &record.attributes {
            if let Some(calculation) = &attribute.calculation {
                formulas.push((
                    ColumnId::attribute(attribute.id),
                    formula_from_payload(&registry, calculation),
                ));
            }
        }
        for (id, formula) in formulas {
            if let Some(column) = registry.column_mut(&id) {
                column.formula = formula;
            }
        }
        registry.repin_anchors();

        debug!(
            template = record.id,
            columns = registry.columns().len(),
            next_attribute = registry.next_attribute_index(),
            "template hydrated"
        );
        registry
    }
}

fn formula_from_payload(registry: &ColumnRegistry, calculation: &CalculationPayload) -> Formula {
    if !calculation.active {
        return Formula::default();
    }

    let operations = calculation
        .operations
        .iter()
        .map(|operation| {
            let bases = operation
                .base_refs
                .iter()
                .flatten()
                .filter_map(|id| BaseKind::from_id(*id))
                .filter_map(|kind| registry.base_column(kind));
            let attributes = operation
                .attribute_refs
                .iter()
                .flatten()
                .filter_map(|index| registry.column(&ColumnId::attribute(*index)));
            let operands = bases.chain(attributes).map(Operand::bound_to).collect();
            Operation::new(operation.operator, operands)
        })
        .filter(|operation| !operation.operands.is_empty())
        .collect();
    Formula::new(operations)
}
