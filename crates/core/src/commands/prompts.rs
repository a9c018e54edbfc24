use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_args;
use crate::{
    errors::{Result, VaultError},
    model::{NewPrompt, PromptPatch},
    runtime,
    sync::Coordinator,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListArgs {
    include_archived: bool,
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArgs {
    query:            String,
    #[serde(default)]
    include_archived: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateArgs {
    title:       String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content:     String,
    #[serde(default)]
    tags:        Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateArgs {
    id:          String,
    #[serde(default)]
    title:       Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content:     Option<String>,
    #[serde(default)]
    tags:        Option<Vec<String>>,
    #[serde(default)]
    change_note: Option<String>,
}

fn not_found(id: &str) -> VaultError {
    VaultError::NotFound(id.to_string())
}

pub fn list(vault: &Coordinator, args: Value) -> Result<Value> {
    let args: ListArgs = parse_args("prompts.list", args)?;
    Ok(json!({ "prompts": vault.list(args.include_archived) }))
}

/// Includes the database's version history when the live copy has none
pub fn get(vault: &Coordinator, args: Value) -> Result<Value> {
    let IdArgs { id } = parse_args("prompts.get", args)?;
    let mut prompt = vault.get(&id).ok_or_else(|| not_found(&id))?;

    if prompt.versions.is_empty() {
        prompt.versions = runtime::block_on(vault.versions(&id))?;
    }
    Ok(json!(prompt))
}

pub fn search(vault: &Coordinator, args: Value) -> Result<Value> {
    let args: SearchArgs = parse_args("prompts.search", args)?;
    Ok(json!({ "prompts": vault.search(&args.query, args.include_archived) }))
}

pub fn create(vault: &Coordinator, args: Value) -> Result<Value> {
    let args: CreateArgs = parse_args("prompts.create", args)?;
    let data = NewPrompt {
        title: args.title,
        description: args.description,
        content: args.content,
        tags: args.tags,
        ..Default::default()
    };
    let prompt = runtime::block_on(vault.create(data))?;
    Ok(json!(prompt))
}

pub fn update(vault: &Coordinator, args: Value) -> Result<Value> {
    let args: UpdateArgs = parse_args("prompts.update", args)?;
    let patch = PromptPatch {
        title: args.title,
        description: args.description,
        content: args.content,
        tags: args.tags,
        ..Default::default()
    };
    let prompt = runtime::block_on(vault.update(&args.id, patch, args.change_note))?
        .ok_or_else(|| not_found(&args.id))?;
    Ok(json!(prompt))
}

pub fn archive(vault: &Coordinator, args: Value) -> Result<Value> {
    let IdArgs { id } = parse_args("prompts.archive", args)?;
    let prompt = runtime::block_on(vault.archive(&id))?.ok_or_else(|| not_found(&id))?;
    Ok(json!(prompt))
}

pub fn restore(vault: &Coordinator, args: Value) -> Result<Value> {
    let IdArgs { id } = parse_args("prompts.restore", args)?;
    let prompt = runtime::block_on(vault.restore(&id))?.ok_or_else(|| not_found(&id))?;
    Ok(json!(prompt))
}

pub fn delete(vault: &Coordinator, args: Value) -> Result<Value> {
    let IdArgs { id } = parse_args("prompts.delete", args)?;
    let deleted = runtime::block_on(vault.delete(&id))?;
    Ok(json!({ "success": deleted }))
}

/// Current file of a directory-backed prompt; `null` in app-only mode
pub fn path(vault: &Coordinator, args: Value) -> Result<Value> {
    let IdArgs { id } = parse_args("prompts.path", args)?;
    let path = runtime::block_on(vault.resolve_file_path(&id))?;
    Ok(json!({ "path": path }))
}
