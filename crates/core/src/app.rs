//! Process-global vault handle for the command surface

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{
    config::VaultConfig,
    errors::{Result, VaultError},
    runtime,
    search::MemoryIndex,
    sync::Coordinator,
};

static VAULT: OnceCell<Arc<Coordinator>> = OnceCell::new();

/// Open and start the vault once. Later calls return the existing handle
/// and ignore `config`.
pub fn setup(config: &VaultConfig) -> Result<Arc<Coordinator>> {
    VAULT
        .get_or_try_init(|| {
            runtime::block_on(async {
                let vault = Coordinator::open(config, Arc::new(MemoryIndex::new())).await?;
                if !vault.start().await? {
                    tracing::warn!(
                        error = %vault.state().error().unwrap_or_default(),
                        "attached directory unavailable; collection is empty"
                    );
                }
                Ok::<_, VaultError>(Arc::new(vault))
            })
        })
        .cloned()
}

pub fn get() -> Result<Arc<Coordinator>> {
    VAULT
        .get()
        .cloned()
        .ok_or_else(|| VaultError::Config("vault is not set up".into()))
}

pub fn is_initialized() -> bool {
    VAULT.get().is_some()
}
