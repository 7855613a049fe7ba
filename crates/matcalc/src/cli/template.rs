//! Template commands: validate, eval, payload, submit, list.

use crate::cli::output::{format_timestamp, or_dash, print_json, print_table};
use crate::cli::resolve_column;
use anyhow::{bail, Context, Result};
use matcalc_schema::{
    evaluate, validate as validate_template, ColumnRegistry, JsonFileTemplateStore, RowDraft,
    TemplateEditor, TemplateRecord, TemplateStore,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Read a template record from a JSON file.
pub fn load_template(path: &Path) -> Result<TemplateRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse template {}", path.display()))
}

pub fn validate(file: &Path) -> Result<()> {
    let registry = ColumnRegistry::from_record(&load_template(file)?);
    match validate_template(&registry) {
        Ok(()) => {
            println!("✓ {} is valid", or_dash(registry.title()));
            Ok(())
        }
        Err(err) => bail!("Template is not valid: {}", err),
    }
}

/// Parse `COLUMN=VALUE` assignments into a row draft.
pub fn parse_assignments(registry: &ColumnRegistry, values: &[String]) -> Result<RowDraft> {
    let aliases = HashMap::new();
    let mut draft = RowDraft::new();
    for assignment in values {
        let Some((column, value)) = assignment.split_once('=') else {
            bail!("Expected COLUMN=VALUE, got '{}'", assignment);
        };
        let id = resolve_column(registry, &aliases, column)?;
        draft.set(id, value.trim());
    }
    Ok(draft)
}

pub fn eval(file: &Path, values: &[String], json: bool) -> Result<()> {
    let registry = ColumnRegistry::from_record(&load_template(file)?);
    let draft = parse_assignments(&registry, values)?;
    let evaluated = evaluate(&registry, &draft);

    if json {
        return print_json(&evaluated);
    }

    let rows = registry
        .columns()
        .iter()
        .map(|column| {
            vec![
                column.id.to_string(),
                column.display_title(),
                or_dash(evaluated.get(&column.id).unwrap_or_default()),
                or_dash(&column.formula.describe()),
            ]
        })
        .collect();
    print_table(&["Column", "Title", "Value", "Calculation"], rows);
    Ok(())
}

pub fn payload(file: &Path) -> Result<()> {
    let editor = TemplateEditor::from_record(&load_template(file)?);
    if let Err(err) = editor.validate() {
        bail!("Template is not valid: {}", err);
    }
    print_json(&editor.payload())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .context("Failed to start async runtime")
}

pub fn submit(file: &Path, store_dir: &Path, editing_id: Option<i64>, json: bool) -> Result<()> {
    let editor = TemplateEditor::from_record(&load_template(file)?);
    let store = JsonFileTemplateStore::new(store_dir);

    let record = runtime()?
        .block_on(editor.submit(&store, editing_id))
        .context("Template was not saved")?;
    info!(template = record.id, "template submitted from CLI");

    if json {
        return print_json(&record);
    }
    let verb = if editing_id.is_some() { "Updated" } else { "Created" };
    println!(
        "{} template {} '{}' in {}",
        verb,
        record.id,
        record.title,
        store.dir().display()
    );
    Ok(())
}

pub fn list(store_dir: &Path, json: bool) -> Result<()> {
    let store = JsonFileTemplateStore::new(store_dir);
    let records = runtime()?
        .block_on(store.list())
        .with_context(|| format!("Failed to list templates in {}", store_dir.display()))?;

    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No templates in {}", store_dir.display());
        return Ok(());
    }

    let rows = records
        .iter()
        .map(|record| {
            let calculations = record
                .base_headers
                .iter()
                .filter(|header| header.calculation.is_some())
                .count()
                + record
                    .attributes
                    .iter()
                    .filter(|attribute| attribute.calculation.is_some())
                    .count();
            vec![
                record.id.to_string(),
                record.title.clone(),
                record.attributes.len().to_string(),
                calculations.to_string(),
                format_timestamp(&record.updated_at),
            ]
        })
        .collect();
    print_table(
        &["ID", "Title", "Attributes", "Calculations", "Updated"],
        rows,
    );
    Ok(())
}
