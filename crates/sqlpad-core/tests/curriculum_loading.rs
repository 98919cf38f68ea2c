//! Curriculum loading from files and load-time checks.

use std::io::Write;

use sqlpad_core::curriculum::{Curriculum, CurriculumError};
use sqlpad_core::RuleKind;

const TOML_COURSE: &str = r#"
[[modules]]
id = 1
title = "Basics"
order = 1

[[modules.tasks]]
id = "basics-1"
module_id = 1
title = "Make a table"
description = "Create the chefs table."

[[modules.tasks.hints]]
level = 1
content = "Use CREATE TABLE."

[modules.tasks.validation]
type = "table_exists"
params = { table = "chefs", columns = ["id", "name"] }
"#;

fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_toml_by_extension() {
    let file = write_temp(".toml", TOML_COURSE);
    let curriculum = Curriculum::from_path(file.path()).unwrap();

    let task = curriculum.task("basics-1").unwrap();
    assert_eq!(task.validation.kind.as_str(), RuleKind::TABLE_EXISTS);
    assert_eq!(task.validation.params["columns"][1], "name");
    assert_eq!(curriculum.hint("basics-1", 1).unwrap().content, "Use CREATE TABLE.");
}

#[test]
fn loads_json_by_extension() {
    let kitchen = serde_json::to_string(&Curriculum::kitchen().unwrap()).unwrap();
    let file = write_temp(".json", &kitchen);
    let curriculum = Curriculum::from_path(file.path()).unwrap();
    assert_eq!(curriculum, Curriculum::kitchen().unwrap());
    assert_eq!(curriculum.task_count(), 10);
}

#[test]
fn rejects_unknown_extension() {
    let file = write_temp(".yaml", "modules: []");
    let err = Curriculum::from_path(file.path()).unwrap_err();
    assert!(matches!(err, CurriculumError::UnsupportedFormat { .. }));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Curriculum::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, CurriculumError::Io { .. }));
}

#[test]
fn rejects_duplicate_task_ids() {
    let raw = r#"{"modules": [
        {"id": 1, "title": "A", "order": 1, "tasks": [
            {"id": "t", "module_id": 1, "title": "x", "description": "",
             "validation": {"type": "custom", "params": {"checkType": "a"}}}
        ]},
        {"id": 2, "title": "B", "order": 2, "tasks": [
            {"id": "t", "module_id": 2, "title": "y", "description": "",
             "validation": {"type": "custom", "params": {"checkType": "b"}}}
        ]}
    ]}"#;
    let err = Curriculum::from_json_str(raw).unwrap_err();
    assert!(matches!(err, CurriculumError::DuplicateTask { task_id } if task_id == "t"));
}

#[test]
fn rejects_out_of_range_hint_level() {
    let raw = r#"{"modules": [
        {"id": 1, "title": "A", "order": 1, "tasks": [
            {"id": "t", "module_id": 1, "title": "x", "description": "",
             "hints": [{"level": 4, "content": "too deep"}],
             "validation": {"type": "custom", "params": {"checkType": "a"}}}
        ]}
    ]}"#;
    let err = Curriculum::from_json_str(raw).unwrap_err();
    assert!(matches!(err, CurriculumError::InvalidHint { level: 4, .. }));
}

#[test]
fn rejects_empty_rule_kind() {
    let raw = r#"{"modules": [
        {"id": 1, "title": "A", "order": 1, "tasks": [
            {"id": "t", "module_id": 1, "title": "x", "description": "",
             "validation": {"type": " ", "params": {}}}
        ]}
    ]}"#;
    let err = Curriculum::from_json_str(raw).unwrap_err();
    assert!(matches!(err, CurriculumError::EmptyRuleKind { .. }));
}

#[test]
fn rejects_task_filed_under_wrong_module() {
    let raw = r#"{"modules": [
        {"id": 1, "title": "A", "order": 1, "tasks": [
            {"id": "t", "module_id": 9, "title": "x", "description": "",
             "validation": {"type": "custom", "params": {"checkType": "a"}}}
        ]}
    ]}"#;
    let err = Curriculum::from_json_str(raw).unwrap_err();
    assert!(matches!(
        err,
        CurriculumError::ModuleMismatch {
            module_id: 1,
            declared: 9,
            ..
        }
    ));
}

#[test]
fn parse_errors_name_the_format() {
    let err = Curriculum::from_json_str("{ not json").unwrap_err();
    assert!(err.to_string().contains("json"));
    let err = Curriculum::from_toml_str("modules = 3").unwrap_err();
    assert!(err.to_string().contains("toml"));
}
