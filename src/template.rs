//! Workspace templates: a named set of files, directories, and ignore
//! patterns that can be stamped into a freshly created workspace.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::ids::Hash;
use crate::store::ContentStore;

/// One file in a template, either inlined or pointing at an existing blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<Hash>,
}

/// A named template: files and directories to stamp into a workspace, plus
/// ignore patterns to write alongside them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub files: Vec<TemplateFile>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

/// Validates a template name is a plain segment: no path traversal, no
/// separators, no NUL bytes.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(StrataError::InvalidName {
            name: name.to_owned(),
            reason: "template names must not contain path separators, NUL bytes, or '..'".to_owned(),
        });
    }
    Ok(())
}

fn path_within(base: &Path, relative: &str) -> Result<PathBuf> {
    use std::path::Component;
    let rel = Path::new(relative);
    if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(StrataError::InvalidName {
            name: relative.to_owned(),
            reason: "path escapes the workspace root".to_owned(),
        });
    }
    Ok(base.join(rel))
}

/// Stamps `template` into `workspace_path`: creates declared directories,
/// writes declared files (inline content or resolved from `store` by
/// `source_hash`), and writes a `.storeignore` if any patterns are set.
///
/// A file naming a `source_hash` the store doesn't have is skipped with a
/// `tracing::warn!` rather than failing the whole template — the rest of
/// the template is still useful.
pub fn apply(template: &Template, workspace_path: &Path, store: Option<&ContentStore>) -> Result<()> {
    for dir in &template.directories {
        let target = path_within(workspace_path, dir)?;
        std::fs::create_dir_all(&target).map_err(|e| io_failure("creating template directory", e))?;
    }

    for file in &template.files {
        let target = path_within(workspace_path, &file.path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_failure("creating template file's parent directory", e))?;
        }
        match (&file.content, &file.source_hash) {
            (Some(content), _) => {
                std::fs::write(&target, content).map_err(|e| io_failure("writing template file", e))?;
            }
            (None, Some(hash)) => match store {
                Some(store) => match store.get(hash)? {
                    Some(object) => {
                        std::fs::write(&target, &object.payload).map_err(|e| io_failure("writing template file from store", e))?;
                    }
                    None => {
                        tracing::warn!(path = %file.path, hash = %hash, "template file references a blob not present in the store");
                    }
                },
                None => {
                    tracing::warn!(path = %file.path, hash = %hash, "template file references a blob but no store was provided");
                }
            },
            (None, None) => {
                tracing::warn!(path = %file.path, "template file has neither content nor source_hash, skipping");
            }
        }
    }

    if !template.ignore_patterns.is_empty() {
        let path = workspace_path.join(".storeignore");
        let body = template.ignore_patterns.join("\n") + "\n";
        std::fs::write(&path, body).map_err(|e| io_failure("writing .storeignore", e))?;
    }

    Ok(())
}

/// Reads a template from `<store_dir>/templates/<name>.json`. Returns
/// `Ok(None)` if no such template exists.
pub fn load(templates_dir: &Path, name: &str) -> Result<Option<Template>> {
    validate_name(name)?;
    let path = templates_dir.join(format!("{name}.json"));
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path).map_err(|e| io_failure("reading template", e))?;
    serde_json::from_str(&text).map(Some).map_err(|e| StrataError::ConfigInvalid {
        path,
        detail: e.to_string(),
    })
}

/// Writes a template to `<templates_dir>/<name>.json`, creating the
/// directory if needed.
pub fn save(templates_dir: &Path, template: &Template) -> Result<()> {
    validate_name(&template.name)?;
    std::fs::create_dir_all(templates_dir).map_err(|e| io_failure("creating templates directory", e))?;
    let path = templates_dir.join(format!("{}.json", template.name));
    let body = serde_json::to_string_pretty(template).map_err(|e| StrataError::ConfigInvalid {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    write_atomic(&templates_dir.to_path_buf(), &path, body.as_bytes())
}

fn write_atomic(parent: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_failure("creating temp template file", e))?;
    tmp.write_all(bytes).map_err(|e| io_failure("writing temp template file", e))?;
    tmp.as_file().sync_all().map_err(|e| io_failure("fsyncing temp template file", e))?;
    tmp.persist(path).map_err(|e| io_failure("renaming temp template file into place", e.error))?;
    Ok(())
}

/// Lists all templates under `templates_dir`, skipping (and logging) any
/// file that fails to parse rather than failing the whole listing.
pub fn list(templates_dir: &Path) -> Result<Vec<Template>> {
    if !templates_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = std::fs::read_dir(templates_dir)
        .map_err(|e| io_failure("reading templates directory", e))?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            name.strip_suffix(".json").map(str::to_owned)
        })
        .collect();
    names.sort();

    let mut templates = Vec::with_capacity(names.len());
    for name in names {
        match load(templates_dir, &name) {
            Ok(Some(template)) => templates.push(template),
            Ok(None) => {}
            Err(e) => tracing::warn!(template = %name, error = %e, "skipping corrupted template"),
        }
    }
    Ok(templates)
}

/// Deletes a template by name. Returns `true` if a file was removed.
pub fn delete(templates_dir: &Path, name: &str) -> Result<bool> {
    validate_name(name)?;
    let path = templates_dir.join(format!("{name}.json"));
    if !path.is_file() {
        return Ok(false);
    }
    std::fs::remove_file(&path).map_err(|e| io_failure("deleting template", e))?;
    Ok(true)
}

fn io_failure(context: &str, source: std::io::Error) -> StrataError {
    StrataError::IoFailure {
        context: context.to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_writes_inline_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        std::fs::create_dir_all(&ws).unwrap();
        let template = Template {
            name: "py-basic".to_owned(),
            description: "minimal python project".to_owned(),
            files: vec![TemplateFile {
                path: "src/main.py".to_owned(),
                content: Some("print('hi')\n".to_owned()),
                source_hash: None,
            }],
            directories: vec!["tests".to_owned()],
            ignore_patterns: vec!["*.pyc".to_owned()],
        };
        apply(&template, &ws, None).unwrap();
        assert_eq!(std::fs::read_to_string(ws.join("src/main.py")).unwrap(), "print('hi')\n");
        assert!(ws.join("tests").is_dir());
        assert_eq!(std::fs::read_to_string(ws.join(".storeignore")).unwrap(), "*.pyc\n");
    }

    #[test]
    fn apply_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        std::fs::create_dir_all(&ws).unwrap();
        let template = Template {
            name: "evil".to_owned(),
            description: String::new(),
            files: vec![TemplateFile {
                path: "../../etc/passwd".to_owned(),
                content: Some("x".to_owned()),
                source_hash: None,
            }],
            directories: vec![],
            ignore_patterns: vec![],
        };
        assert!(apply(&template, &ws, None).is_err());
    }

    #[test]
    fn save_load_list_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let templates_dir = dir.path().join("templates");
        let template = Template {
            name: "rust-basic".to_owned(),
            description: "minimal rust crate".to_owned(),
            files: vec![],
            directories: vec!["src".to_owned()],
            ignore_patterns: vec![],
        };
        save(&templates_dir, &template).unwrap();
        assert_eq!(load(&templates_dir, "rust-basic").unwrap(), Some(template));
        assert_eq!(list(&templates_dir).unwrap().len(), 1);
        assert!(delete(&templates_dir, "rust-basic").unwrap());
        assert!(load(&templates_dir, "rust-basic").unwrap().is_none());
    }

    #[test]
    fn invalid_name_is_rejected() {
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("fine-name").is_ok());
    }
}
