//! CLI module for matcalc
//!
//! Template commands read a JSON template record from disk; store commands
//! work against a directory of JSON files.

pub mod config;
pub mod output;
pub mod script;
pub mod template;

use anyhow::{bail, Result};
use matcalc_schema::{BaseKind, ColumnId, ColumnRegistry};
use std::collections::HashMap;

/// Resolve a user-supplied column reference.
///
/// Accepts, in order: a script alias, a column id (`base-2`, `attr-1`), a base
/// column name (`quantity`, `unit_cost`) and finally a column title, compared
/// case-insensitively.
pub fn resolve_column(
    registry: &ColumnRegistry,
    aliases: &HashMap<String, ColumnId>,
    token: &str,
) -> Result<ColumnId> {
    let token = token.trim();
    if let Some(id) = aliases.get(token) {
        return Ok(id.clone());
    }
    if let Ok(id) = ColumnId::parse(token) {
        if registry.contains(&id) || registry.removed_columns().iter().any(|c| c.id == id) {
            return Ok(id);
        }
    }
    if let Ok(kind) = token.parse::<BaseKind>() {
        return Ok(kind.column_id());
    }

    let matches: Vec<&ColumnId> = registry
        .columns()
        .iter()
        .chain(registry.removed_columns())
        .filter(|column| column.title.trim().eq_ignore_ascii_case(token))
        .map(|column| &column.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).clone()),
        [] => bail!("Unknown column: '{}'", token),
        _ => bail!("Ambiguous column title: '{}'", token),
    }
}
