//! Property tests for anchored column ordering.
//!
//! Whatever sequence of lifecycle edits and reorders is applied, Detail stays
//! first, Unit Cost stays directly before Total, and Total keeps the terminal
//! order value.

use matcalc_schema::{BaseKind, ColumnId, ColumnRegistry, TOTAL_ORDER};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Edit {
    AddAttribute,
    Remove(usize),
    Restore(usize),
    AddBase(bool),
    Reorder(Vec<usize>),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => Just(Edit::AddAttribute),
        2 => any::<usize>().prop_map(Edit::Remove),
        1 => any::<usize>().prop_map(Edit::Restore),
        1 => any::<bool>().prop_map(Edit::AddBase),
        3 => prop::collection::vec(any::<usize>(), 0..8).prop_map(Edit::Reorder),
    ]
}

fn pick(ids: &[ColumnId], seed: usize) -> Option<ColumnId> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[seed % ids.len()].clone())
    }
}

fn apply(registry: &mut ColumnRegistry, edit: &Edit) {
    let all: Vec<ColumnId> = registry.columns().iter().map(|c| c.id.clone()).collect();
    match edit {
        Edit::AddAttribute => {
            registry.add_attribute_column();
        }
        Edit::Remove(seed) => {
            if let Some(id) = pick(&all, *seed) {
                registry.rename_column(&id, "kept");
                registry.remove_column(&id);
            }
        }
        Edit::Restore(seed) => {
            let removed: Vec<ColumnId> =
                registry.removed_columns().iter().map(|c| c.id.clone()).collect();
            if let Some(id) = pick(&removed, *seed) {
                registry.restore_removed_column(&id);
            }
        }
        Edit::AddBase(quantity) => {
            let kind = if *quantity {
                BaseKind::Quantity
            } else {
                BaseKind::Unit
            };
            registry.add_base_column(kind);
        }
        Edit::Reorder(seeds) => {
            // Includes anchors on purpose; they must be ignored.
            let ordered: Vec<ColumnId> = seeds
                .iter()
                .filter_map(|seed| pick(&all, *seed))
                .collect();
            registry.reorder_movable_columns(&ordered);
        }
    }
}

fn order_of(registry: &ColumnRegistry, kind: BaseKind) -> u32 {
    registry.base_column(kind).map(|c| c.order).unwrap_or_default()
}

fn check_anchors(registry: &ColumnRegistry) -> Result<(), TestCaseError> {
    let detail = order_of(registry, BaseKind::Detail);
    let unit_cost = order_of(registry, BaseKind::UnitCost);
    let columns = registry.columns();

    prop_assert_eq!(order_of(registry, BaseKind::Total), TOTAL_ORDER);
    prop_assert_eq!(columns.first().and_then(|c| c.base_kind()), Some(BaseKind::Detail));
    prop_assert_eq!(columns.last().and_then(|c| c.base_kind()), Some(BaseKind::Total));
    prop_assert_eq!(
        columns[columns.len() - 2].base_kind(),
        Some(BaseKind::UnitCost)
    );

    for column in columns {
        match column.base_kind() {
            Some(BaseKind::Detail) | Some(BaseKind::UnitCost) | Some(BaseKind::Total) => {}
            _ => {
                prop_assert!(column.order > detail, "{} not after Detail", column.id);
                prop_assert!(column.order < unit_cost, "{} not before Unit Cost", column.id);
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn test_anchor_orders_hold(edits in prop::collection::vec(edit(), 0..40)) {
        let mut registry = ColumnRegistry::with_default_columns();
        check_anchors(&registry)?;
        for edit in &edits {
            apply(&mut registry, edit);
            check_anchors(&registry)?;
        }
    }

    #[test]
    fn test_reorder_is_idempotent(count in 0usize..6, seeds in prop::collection::vec(any::<usize>(), 0..8)) {
        let mut registry = ColumnRegistry::with_default_columns();
        for _ in 0..count {
            registry.add_attribute_column();
        }
        let all: Vec<ColumnId> = registry.columns().iter().map(|c| c.id.clone()).collect();
        let ordered: Vec<ColumnId> = seeds.iter().filter_map(|seed| pick(&all, *seed)).collect();

        registry.reorder_movable_columns(&ordered);
        let once = registry.clone();
        let current: Vec<ColumnId> = registry.columns().iter().map(|c| c.id.clone()).collect();
        registry.reorder_movable_columns(&current);
        prop_assert_eq!(registry, once);
    }
}
