//! Read-only lesson catalog: modules, tasks, hint ladders and the rule that
//! checks each task.
//!
//! Curricula load from JSON or TOML. Loading rejects catalogs that would make
//! lookups ambiguous (duplicate ids) or hints unreachable.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::validation::ValidationRule;

const KITCHEN_JSON: &str = include_str!("../curriculum/kitchen.json");

/// Hints are numbered from the gentlest nudge to the full answer.
pub const HINT_LEVELS: std::ops::RangeInclusive<u8> = 1..=3;

#[derive(Debug, thiserror::Error)]
pub enum CurriculumError {
    #[error("failed to read curriculum {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} curriculum: {reason}")]
    Parse { format: &'static str, reason: String },

    #[error("unsupported curriculum file '{path}' (expected .json or .toml)")]
    UnsupportedFormat { path: PathBuf },

    #[error("duplicate module id {module_id}")]
    DuplicateModule { module_id: u32 },

    #[error("duplicate task id '{task_id}'")]
    DuplicateTask { task_id: String },

    #[error("task '{task_id}' declares module {declared} but is listed under module {module_id}")]
    ModuleMismatch {
        task_id: String,
        module_id: u32,
        declared: u32,
    },

    #[error("task '{task_id}' has hint level {level}, expected 1..=3")]
    InvalidHint { task_id: String, level: u8 },

    #[error("task '{task_id}' has a validation rule without a type")]
    EmptyRuleKind { task_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub level: u8,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub module_id: u32,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub hints: Vec<Hint>,
    pub validation: ValidationRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: u32,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Ordered catalog of modules. Modules are kept sorted by `order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curriculum {
    modules: Vec<Module>,
}

impl Curriculum {
    /// Build from modules, validating and ordering them.
    pub fn new(mut modules: Vec<Module>) -> Result<Self, CurriculumError> {
        validate(&modules)?;
        modules.sort_by_key(|m| m.order);
        Ok(Self { modules })
    }

    /// The bundled kitchen-themed sample course.
    pub fn kitchen() -> Result<Self, CurriculumError> {
        Self::from_json_str(KITCHEN_JSON)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CurriculumError> {
        let parsed: Curriculum =
            serde_json::from_str(raw).map_err(|e| CurriculumError::Parse {
                format: "json",
                reason: e.to_string(),
            })?;
        Self::new(parsed.modules)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CurriculumError> {
        let parsed: Curriculum = toml::from_str(raw).map_err(|e| CurriculumError::Parse {
            format: "toml",
            reason: e.to_string(),
        })?;
        Self::new(parsed.modules)
    }

    /// Load a `.json` or `.toml` file, chosen by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CurriculumError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let raw = || {
            std::fs::read_to_string(path).map_err(|source| CurriculumError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        match extension.as_deref() {
            Some("json") => Self::from_json_str(&raw()?),
            Some("toml") => Self::from_toml_str(&raw()?),
            _ => Err(CurriculumError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, id: u32) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// All tasks in module order, then in the order listed within a module.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.modules.iter().flat_map(|m| m.tasks.iter())
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks().find(|t| t.id == id)
    }

    pub fn hint(&self, task_id: &str, level: u8) -> Option<&Hint> {
        self.task(task_id)?.hints.iter().find(|h| h.level == level)
    }

    pub fn task_count(&self) -> usize {
        self.modules.iter().map(|m| m.tasks.len()).sum()
    }
}

fn validate(modules: &[Module]) -> Result<(), CurriculumError> {
    let mut module_ids = HashSet::new();
    let mut task_ids = HashSet::new();

    for module in modules {
        if !module_ids.insert(module.id) {
            return Err(CurriculumError::DuplicateModule {
                module_id: module.id,
            });
        }
        for task in &module.tasks {
            if !task_ids.insert(task.id.as_str()) {
                return Err(CurriculumError::DuplicateTask {
                    task_id: task.id.clone(),
                });
            }
            if task.module_id != module.id {
                return Err(CurriculumError::ModuleMismatch {
                    task_id: task.id.clone(),
                    module_id: module.id,
                    declared: task.module_id,
                });
            }
            if let Some(hint) = task.hints.iter().find(|h| !HINT_LEVELS.contains(&h.level)) {
                return Err(CurriculumError::InvalidHint {
                    task_id: task.id.clone(),
                    level: hint.level,
                });
            }
            if task.validation.kind.as_str().trim().is_empty() {
                return Err(CurriculumError::EmptyRuleKind {
                    task_id: task.id.clone(),
                });
            }
        }
    }
    Ok(())
}
