use clap::{Args, Subcommand};
use serde::Serialize;
use strata::ids::WorkspaceName;
use strata::template::Template;

use crate::context::Context;
use crate::format;

/// Save, list, apply, or delete workspace templates
#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// List saved templates
    List(TemplateListArgs),
    /// Save a template from a JSON definition file
    Save(TemplateSaveArgs),
    /// Stamp a saved template into a workspace
    Apply(TemplateApplyArgs),
    /// Delete a saved template
    Delete(TemplateDeleteArgs),
}

#[derive(Args, Debug)]
pub struct TemplateListArgs {}

#[derive(Args, Debug)]
pub struct TemplateSaveArgs {
    /// Path to a JSON file matching the template schema (name, files, directories, ignore_patterns)
    pub definition: std::path::PathBuf,
}

#[derive(Args, Debug)]
pub struct TemplateApplyArgs {
    /// Name of the saved template
    pub name: String,

    /// Workspace to stamp it into
    #[arg(long, default_value = "main")]
    pub workspace: String,
}

#[derive(Args, Debug)]
pub struct TemplateDeleteArgs {
    /// Name of the template to delete
    pub name: String,
}

#[derive(Serialize)]
struct TemplateEntry {
    name: String,
    description: String,
    file_count: usize,
}

pub fn run(ctx: &Context, cmd: &TemplateCommands) -> strata::Result<()> {
    let repo = ctx.open()?;
    match cmd {
        TemplateCommands::List(_) => {
            let entries: Vec<TemplateEntry> = repo
                .list_templates()?
                .into_iter()
                .map(|t| TemplateEntry { name: t.name, description: t.description, file_count: t.files.len() })
                .collect();
            format::emit(ctx, &entries, |entries| {
                for e in entries {
                    println!("{} ({} files) - {}", e.name, e.file_count, e.description);
                }
            });
        }
        TemplateCommands::Save(args) => {
            let text = std::fs::read_to_string(&args.definition).map_err(|e| strata::StrataError::IoFailure {
                context: "reading template definition".to_owned(),
                source: e,
            })?;
            let template: Template = serde_json::from_str(&text).map_err(|e| strata::StrataError::ConfigInvalid {
                path: args.definition.clone(),
                detail: e.to_string(),
            })?;
            let name = template.name.clone();
            repo.save_template(&template)?;
            println!("saved template '{name}'");
        }
        TemplateCommands::Apply(args) => {
            let workspace = WorkspaceName::new(args.workspace.clone())?;
            repo.apply_template(&workspace, &args.name)?;
            println!("applied template '{}' to '{}'", args.name, workspace);
        }
        TemplateCommands::Delete(args) => {
            if repo.delete_template(&args.name)? {
                println!("deleted template '{}'", args.name);
            } else {
                println!("no such template '{}'", args.name);
            }
        }
    }
    Ok(())
}
