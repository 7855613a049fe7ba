//! Scripted editing sessions
//!
//! A script is a TOML file with an optional starting template and a list of
//! steps, each one an editor action:
//!
//! ```toml
//! title = "Cement"
//!
//! [[steps]]
//! action = "add_attribute"
//! alias = "w"
//! title = "Weight"
//! quantity = true
//!
//! [[steps]]
//! action = "attach"
//! column = "unit_cost"
//! operator = "multiply"
//!
//! [[steps]]
//! action = "select"
//! column = "w"
//! ```

use crate::cli::output::{or_dash, print_json, print_table};
use crate::cli::resolve_column;
use crate::cli::template::load_template;
use anyhow::{bail, Context, Result};
use matcalc_schema::{BaseKind, ColumnId, Notification, Operator, TemplateEditor};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct RunArgs {
    pub script: PathBuf,
    pub json: bool,
    pub flash_duration: Duration,
}

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub title: Option<String>,
    /// Template JSON to start from, relative to the script file
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    SetTitle {
        title: String,
    },
    AddBase {
        kind: String,
    },
    AddAttribute {
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        quantity: Option<bool>,
    },
    AnswerQuantity {
        column: String,
        is_quantity: bool,
    },
    Rename {
        column: String,
        title: String,
    },
    Remove {
        column: String,
    },
    Restore {
        column: String,
    },
    Discard {
        column: String,
    },
    Reorder {
        columns: Vec<String>,
    },
    Attach {
        column: String,
        #[serde(default)]
        operator: Operator,
    },
    Select {
        column: String,
    },
    Click {
        column: String,
        operation: usize,
        operand: usize,
    },
    Rebind {
        column: String,
        operation: usize,
        operand: usize,
    },
    Cancel,
    PointerOutside,
    RemoveOperand {
        column: String,
        operation: usize,
        operand: usize,
    },
    Set {
        column: String,
        value: String,
    },
}

/// Replays script steps against one editing session.
pub struct ScriptRunner {
    editor: TemplateEditor,
    aliases: HashMap<String, ColumnId>,
    warnings: Vec<String>,
}

impl ScriptRunner {
    pub fn new(editor: TemplateEditor) -> Self {
        Self {
            editor,
            aliases: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn editor(&self) -> &TemplateEditor {
        &self.editor
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn column(&self, token: &str) -> Result<ColumnId> {
        resolve_column(self.editor.registry(), &self.aliases, token)
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// Apply one step. Unknown columns abort the script; refused actions
    /// only produce a warning.
    pub fn apply(&mut self, step: &Step) -> Result<()> {
        debug!(?step, "applying script step");
        match step {
            Step::SetTitle { title } => self.editor.set_title(title.clone()),
            Step::AddBase { kind } => {
                let kind: BaseKind = kind.parse().map_err(anyhow::Error::msg)?;
                if !self.editor.add_base_column(kind) {
                    self.warn(format!("{} is already present", kind));
                }
            }
            Step::AddAttribute {
                alias,
                title,
                quantity,
            } => {
                let id = self.editor.add_attribute_column();
                if let Some(title) = title {
                    self.editor.rename_column(&id, title.clone());
                }
                if let Some(is_quantity) = quantity {
                    self.editor.answer_quantity_question(&id, *is_quantity);
                }
                if let Some(alias) = alias {
                    self.aliases.insert(alias.clone(), id);
                }
            }
            Step::AnswerQuantity {
                column,
                is_quantity,
            } => {
                let id = self.column(column)?;
                if !self.editor.answer_quantity_question(&id, *is_quantity) {
                    self.warn(format!("{} has no pending quantity question", id));
                }
            }
            Step::Rename { column, title } => {
                let id = self.column(column)?;
                if !self.editor.rename_column(&id, title.clone()) {
                    self.warn(format!("{} cannot be renamed", id));
                }
            }
            Step::Remove { column } => {
                let id = self.column(column)?;
                if !self.editor.remove_column(&id) {
                    self.warn(format!("{} cannot be removed", id));
                }
            }
            Step::Restore { column } => {
                let id = self.column(column)?;
                if !self.editor.restore_removed_column(&id) {
                    self.warn(format!("{} is not in the removed list", id));
                }
            }
            Step::Discard { column } => {
                let id = self.column(column)?;
                if !self.editor.discard_removed_column(&id) {
                    self.warn(format!("{} is not in the removed list", id));
                }
            }
            Step::Reorder { columns } => {
                let ids = columns
                    .iter()
                    .map(|token| self.column(token))
                    .collect::<Result<Vec<_>>>()?;
                self.editor.reorder_movable_columns(&ids);
            }
            Step::Attach { column, operator } => {
                let id = self.column(column)?;
                match self.editor.attach_operation(&id, *operator) {
                    Ok(true) => {}
                    Ok(false) => self.warn(format!("{} does not accept a calculation", id)),
                    Err(err) => self.warn(format!("{}: {}", id, err)),
                }
            }
            Step::Select { column } => {
                let id = self.column(column)?;
                if !self.editor.select_column(&id) {
                    self.warn(format!("{} cannot be selected here", id));
                }
            }
            Step::Click {
                column,
                operation,
                operand,
            } => {
                let id = self.column(column)?;
                if !self.editor.click_operand(&id, *operation, *operand) {
                    self.warn(format!("{} has no operand {}.{}", id, operation, operand));
                }
            }
            Step::Rebind {
                column,
                operation,
                operand,
            } => {
                let id = self.column(column)?;
                if !self.editor.rebind_operand(&id, *operation, *operand) {
                    self.warn(format!("{} has no operand {}.{}", id, operation, operand));
                }
            }
            Step::Cancel => {
                self.editor.cancel_selection();
            }
            Step::PointerOutside => {
                self.editor.pointer_outside();
            }
            Step::RemoveOperand {
                column,
                operation,
                operand,
            } => {
                let id = self.column(column)?;
                match self.editor.plan_operand_removal(&id, *operation, *operand) {
                    Some(removal) => {
                        info!(prompt = %removal.prompt, "confirming operand removal");
                        self.editor.apply_operand_removal(&removal);
                    }
                    None => self.warn(format!(
                        "operand {}.{} of {} cannot be removed",
                        operation, operand, id
                    )),
                }
            }
            Step::Set { column, value } => {
                let id = self.column(column)?;
                self.editor.set_value(&id, value.clone());
            }
        }

        for notification in self.editor.drain_notifications() {
            match notification {
                Notification::Flash { column, duration } => {
                    debug!(%column, ?duration, "flash");
                }
                Notification::Highlight(columns) => {
                    debug!(count = columns.len(), "highlight selectable columns");
                }
            }
        }
        Ok(())
    }
}

pub fn load_script(path: &Path) -> Result<Script> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse script {}", path.display()))
}

fn initial_editor(
    script: &Script,
    script_path: &Path,
    flash_duration: Duration,
) -> Result<TemplateEditor> {
    let editor = match &script.template {
        Some(template) => {
            let base = script_path.parent().unwrap_or_else(|| Path::new("."));
            TemplateEditor::from_record(&load_template(&base.join(template))?)
        }
        None => TemplateEditor::new(),
    };
    let mut editor = editor.with_flash_duration(flash_duration);
    if let Some(title) = &script.title {
        editor.set_title(title.clone());
    }
    Ok(editor)
}

pub fn run(args: RunArgs) -> Result<()> {
    let script = load_script(&args.script)?;
    let editor = initial_editor(&script, &args.script, args.flash_duration)?;

    let mut runner = ScriptRunner::new(editor);
    for (index, step) in script.steps.iter().enumerate() {
        runner
            .apply(step)
            .with_context(|| format!("Step {} failed", index + 1))?;
    }
    info!(
        steps = script.steps.len(),
        warnings = runner.warnings().len(),
        "script finished"
    );

    for message in runner.warnings() {
        eprintln!("warning: {}", message);
    }

    let editor = runner.editor();
    if let Err(err) = editor.validate() {
        bail!("Template is not valid: {}", err);
    }

    if args.json {
        return print_json(&editor.payload());
    }

    let rows = editor
        .registry()
        .columns()
        .iter()
        .map(|column| {
            vec![
                column.order.to_string(),
                column.id.to_string(),
                column.display_title(),
                or_dash(editor.draft().get(&column.id).unwrap_or_default()),
                or_dash(&column.formula.describe()),
            ]
        })
        .collect();
    print_table(&["Order", "Column", "Title", "Value", "Calculation"], rows);
    Ok(())
}
