use async_trait::async_trait;

use super::{Backend, BackendKind};
use crate::{
    db::{Db, ListOptions},
    errors::Result,
    model::{NewPrompt, Prompt, PromptPatch},
};

/// Relational backend scoped to one device user
#[derive(Debug, Clone)]
pub struct DatabaseBackend {
    db:      Db,
    user_id: String,
}

impl DatabaseBackend {
    /// Bind to the user owning `device_id`, creating it if needed
    pub async fn connect(db: Db, device_id: &str) -> Result<Self> {
        let user = db.get_or_create_user(device_id).await?;
        Ok(Self {
            db,
            user_id: user.id,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Remove the row and its history for good
    pub async fn hard_delete(&self, id: &str) -> Result<bool> {
        self.db.delete_prompt(id).await
    }
}

#[async_trait]
impl Backend for DatabaseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Database
    }

    async fn load_all(&self) -> Result<Vec<Prompt>> {
        self.db
            .get_prompts_by_user_id(&self.user_id, ListOptions { include_archived: true })
            .await
    }

    async fn create(&self, data: &NewPrompt) -> Result<Prompt> {
        // Upsert: mirrored prompts carry their id
        if let Some(id) = data.id.as_deref() {
            if self.db.get_prompt(id).await?.is_some() {
                let patch = PromptPatch {
                    title:       Some(data.title.clone()),
                    description: Some(data.description.clone()),
                    content:     Some(data.content.clone()),
                    tags:        Some(data.tags.clone()),
                    is_archived: Some(data.is_archived),
                    updated_at:  data.updated_at,
                };
                if let Some(prompt) = self.db.update_prompt(id, &patch, None).await? {
                    return Ok(prompt);
                }
            }
        }

        self.db.create_prompt(&self.user_id, data).await
    }

    async fn update(
        &self,
        id: &str,
        patch: &PromptPatch,
        change_note: Option<&str>,
    ) -> Result<Option<Prompt>> {
        self.db.update_prompt(id, patch, change_note).await
    }

    async fn archive(&self, id: &str) -> Result<Option<Prompt>> {
        self.db.archive_prompt(id).await
    }

    async fn restore(&self, id: &str) -> Result<Option<Prompt>> {
        self.db.restore_prompt(id).await
    }

    /// Soft delete
    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.db.archive_prompt(id).await?.is_some())
    }
}
