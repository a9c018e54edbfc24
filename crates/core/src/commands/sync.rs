use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_args;
use crate::{
    errors::Result,
    runtime,
    sync::{Coordinator, FixedFolder, SyncMode},
};

#[derive(Debug, Deserialize)]
struct SwitchArgs {
    mode: String,
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AttachArgs {
    /// Absent means the user cancelled the picker
    path: Option<PathBuf>,
}

pub fn status(vault: &Coordinator, _args: Value) -> Result<Value> {
    Ok(json!(vault.status()))
}

pub fn switch_mode(vault: &Coordinator, args: Value) -> Result<Value> {
    let args: SwitchArgs = parse_args("sync.switch_mode", args)?;
    let mode: SyncMode = args.mode.parse()?;

    runtime::block_on(vault.switch_mode(mode, args.path))?;
    Ok(json!(vault.status()))
}

pub fn attach(vault: &Coordinator, args: Value) -> Result<Value> {
    let args: AttachArgs = parse_args("sync.attach", args)?;
    let picker = FixedFolder(args.path);

    let attached = runtime::block_on(vault.attach_directory(&picker))?;
    Ok(json!({ "attached": attached.is_some(), "status": vault.status() }))
}

pub fn detach(vault: &Coordinator, _args: Value) -> Result<Value> {
    runtime::block_on(vault.detach_directory())?;
    Ok(json!(vault.status()))
}

pub fn validate(vault: &Coordinator, _args: Value) -> Result<Value> {
    let valid = runtime::block_on(vault.validate_current_mode());
    Ok(json!({ "valid": valid, "error": vault.state().error() }))
}
