//! Persisted template read model.
//!
//! A [`TemplateRecord`] is what a store hands back: every base header with
//! its active flag, every attribute with a resolved id, and the flattened
//! order list. Stores build one from a submitted [`TemplatePayload`].

use crate::column::{BaseKind, ColumnKind};
use crate::serializer::{CalculationPayload, OrderEntry, TemplatePayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    #[serde(rename = "id_tipo_material")]
    pub id: i64,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "headers_base", default)]
    pub base_headers: Vec<BaseHeaderRecord>,
    #[serde(rename = "headers_atributes", default)]
    pub attributes: Vec<AttributeRecord>,
    #[serde(rename = "order_headers", default)]
    pub order: Vec<OrderEntry>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseHeaderRecord {
    #[serde(rename = "id_header_base")]
    pub base_id: u8,
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(rename = "calculo", default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<CalculationPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    #[serde(rename = "id_header_atribute")]
    pub id: u32,
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(rename = "isCantidad", default)]
    pub is_quantity: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(rename = "calculo", default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<CalculationPayload>,
}

fn default_active() -> bool {
    true
}

impl TemplateRecord {
    /// Materialize the stored form of a submitted payload.
    pub fn from_payload(id: i64, payload: &TemplatePayload) -> Self {
        let base_headers = BaseKind::ALL
            .into_iter()
            .map(|kind| {
                let calculation = payload
                    .base_calculations
                    .iter()
                    .find(|entry| entry.base_id == kind.id());
                let order = payload
                    .order
                    .iter()
                    .find(|entry| entry.kind == ColumnKind::Base && entry.id == u32::from(kind.id()))
                    .map(|entry| entry.order)
                    .or_else(|| calculation.map(|entry| entry.order));
                BaseHeaderRecord {
                    base_id: kind.id(),
                    title: calculation
                        .map(|entry| entry.title.clone())
                        .unwrap_or_else(|| kind.label().to_string()),
                    active: !kind.is_optional() || payload.active_base.contains(&kind.id()),
                    calculation: calculation.and_then(|entry| entry.calculation.clone()),
                    order,
                }
            })
            .collect();

        let attributes = payload
            .attributes
            .iter()
            .enumerate()
            .map(|(position, attribute)| AttributeRecord {
                id: attribute.id.unwrap_or(position as u32 + 1),
                title: attribute.title.clone(),
                is_quantity: attribute.is_quantity,
                order: Some(attribute.order),
                calculation: attribute.calculation.clone(),
            })
            .collect();

        Self {
            id,
            title: payload.title.clone(),
            base_headers,
            attributes,
            order: payload.order.clone(),
            updated_at: Utc::now(),
        }
    }

    /// Base kinds marked active, in kind order.
    pub fn active_base_kinds(&self) -> Vec<BaseKind> {
        BaseKind::ALL
            .into_iter()
            .filter(|kind| {
                !kind.is_optional()
                    || self
                        .base_headers
                        .iter()
                        .any(|header| header.base_id == kind.id() && header.active)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ColumnRegistry;
    use crate::serializer::{serialize, AttributePayload};

    #[test]
    fn test_from_default_payload() {
        let mut registry = ColumnRegistry::with_default_columns();
        registry.set_title("Cement");
        registry.remove_column(&BaseKind::Unit.column_id());
        let record = TemplateRecord::from_payload(7, &serialize(&registry));

        assert_eq!(record.id, 7);
        assert_eq!(record.title, "Cement");
        assert_eq!(record.base_headers.len(), 5);
        assert_eq!(
            record.active_base_kinds(),
            vec![
                BaseKind::Detail,
                BaseKind::Quantity,
                BaseKind::UnitCost,
                BaseKind::Total
            ]
        );

        let total = &record.base_headers[4];
        assert_eq!(total.order, Some(999));
        assert!(total.calculation.is_some());
        let unit = &record.base_headers[2];
        assert!(!unit.active);
        assert_eq!(unit.order, None);
    }

    #[test]
    fn test_attribute_id_falls_back_to_position() {
        let mut payload = serialize(&ColumnRegistry::with_default_columns());
        payload.attributes = vec![
            AttributePayload {
                id: None,
                title: "Weight".to_string(),
                is_quantity: true,
                order: 4,
                calculation: None,
            },
            AttributePayload {
                id: Some(9),
                title: "Color".to_string(),
                is_quantity: false,
                order: 5,
                calculation: None,
            },
        ];
        let record = TemplateRecord::from_payload(1, &payload);
        let ids: Vec<u32> = record.attributes.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 9]);
    }

    #[test]
    fn test_record_json_defaults() {
        let json = r#"{
            "id_tipo_material": 3,
            "titulo": "Paint",
            "headers_base": [{ "id_header_base": 2, "titulo": "Liters" }],
            "headers_atributes": [{ "id_header_atribute": 4, "titulo": "Color" }]
        }"#;
        let record: TemplateRecord = serde_json::from_str(json).unwrap();
        assert!(record.base_headers[0].active);
        assert!(!record.attributes[0].is_quantity);
        assert!(record.order.is_empty());
    }
}
