use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Db;
use crate::{
    errors::Result,
    model::{normalize_tags, now_millis, NewPrompt, Prompt, PromptPatch, PromptVersion},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id:         String,
    pub device_id:  String,
    pub created_at: i64,
}

/// Filters for [`Db::get_prompts_by_user_id`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub include_archived: bool,
}

#[derive(Debug, Clone, FromRow)]
struct PromptRow {
    id:          String,
    title:       String,
    description: String,
    content:     String,
    tags:        Option<String>,
    is_archived: bool,
    created_at:  i64,
    updated_at:  i64,
}

#[derive(Debug, Clone, FromRow)]
struct VersionRow {
    prompt_id:      String,
    version_number: i64,
    change_note:    Option<String>,
    created_at:     i64,
}

impl PromptRow {
    fn into_prompt(self, versions: Vec<PromptVersion>) -> Prompt {
        let tags = self
            .tags
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default();

        Prompt {
            id: self.id,
            title: self.title,
            description: self.description,
            content: self.content,
            tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_archived: self.is_archived,
            versions,
            file_path: None,
        }
    }
}

impl From<VersionRow> for PromptVersion {
    fn from(row: VersionRow) -> Self {
        PromptVersion {
            version_number: row.version_number,
            timestamp:      row.created_at,
            change_note:    row.change_note,
        }
    }
}

fn tags_json(tags: &[String]) -> Result<String> {
    Ok(serde_json::to_string(tags)?)
}

impl Db {
    /// Fetch the user bound to `device_id`, creating it on first use
    pub async fn get_or_create_user(&self, device_id: &str) -> Result<User> {
        if let Some(user) = sqlx::query_as::<_, User>("SELECT * FROM users WHERE device_id = ?")
            .bind(device_id)
            .fetch_optional(self.pool())
            .await?
        {
            return Ok(user);
        }

        let user = User {
            id:         Uuid::new_v4().to_string(),
            device_id:  device_id.to_string(),
            created_at: now_millis(),
        };

        sqlx::query("INSERT OR IGNORE INTO users (id, device_id, created_at) VALUES (?, ?, ?)")
            .bind(&user.id)
            .bind(&user.device_id)
            .bind(user.created_at)
            .execute(self.pool())
            .await?;

        // Another connection may have won the insert
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE device_id = ?")
            .bind(device_id)
            .fetch_one(self.pool())
            .await?;

        Ok(user)
    }

    pub async fn get_prompts_by_user_id(&self, user_id: &str, opts: ListOptions) -> Result<Vec<Prompt>> {
        let sql = if opts.include_archived {
            "SELECT * FROM prompts WHERE user_id = ? ORDER BY updated_at DESC"
        } else {
            "SELECT * FROM prompts WHERE user_id = ? AND is_archived = 0 ORDER BY updated_at DESC"
        };

        let rows = sqlx::query_as::<_, PromptRow>(sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;

        let version_rows = sqlx::query_as::<_, VersionRow>(
            "SELECT v.prompt_id, v.version_number, v.change_note, v.created_at
             FROM prompt_versions v JOIN prompts p ON p.id = v.prompt_id
             WHERE p.user_id = ?
             ORDER BY v.prompt_id, v.version_number",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        let mut versions: HashMap<String, Vec<PromptVersion>> = HashMap::new();
        for row in version_rows {
            versions.entry(row.prompt_id.clone()).or_default().push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let history = versions.remove(&row.id).unwrap_or_default();
                row.into_prompt(history)
            })
            .collect())
    }

    pub async fn get_prompt(&self, id: &str) -> Result<Option<Prompt>> {
        let row = sqlx::query_as::<_, PromptRow>("SELECT * FROM prompts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let versions = self.get_versions(id).await?;
                Ok(Some(row.into_prompt(versions)))
            },
            None => Ok(None),
        }
    }

    /// Ordered version history of one prompt
    pub async fn get_versions(&self, prompt_id: &str) -> Result<Vec<PromptVersion>> {
        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT prompt_id, version_number, change_note, created_at
             FROM prompt_versions WHERE prompt_id = ? ORDER BY version_number",
        )
        .bind(prompt_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(PromptVersion::from).collect())
    }

    /// Insert a prompt and its first version
    pub async fn create_prompt(&self, user_id: &str, data: &NewPrompt) -> Result<Prompt> {
        let id = data.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = now_millis();
        let created_at = data.created_at.unwrap_or(now);
        let updated_at = data.updated_at.unwrap_or(created_at);
        let tags = normalize_tags(&data.tags);

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO prompts (id, user_id, title, description, content, tags, is_archived, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(&data.content)
        .bind(tags_json(&tags)?)
        .bind(data.is_archived)
        .bind(created_at)
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO prompt_versions (prompt_id, version_number, content, change_note, created_at)
             VALUES (?, 1, ?, NULL, ?)",
        )
        .bind(&id)
        .bind(&data.content)
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Prompt {
            id,
            title: data.title.clone(),
            description: data.description.clone(),
            content: data.content.clone(),
            tags,
            created_at,
            updated_at,
            is_archived: data.is_archived,
            versions: vec![PromptVersion {
                version_number: 1,
                timestamp:      updated_at,
                change_note:    None,
            }],
            file_path: None,
        })
    }

    /// Apply a partial update. A new version is appended only when the
    /// content changes. Returns `None` when the id is unknown.
    pub async fn update_prompt(
        &self,
        id: &str,
        patch: &PromptPatch,
        change_note: Option<&str>,
    ) -> Result<Option<Prompt>> {
        let Some(mut prompt) = self.get_prompt(id).await? else {
            return Ok(None);
        };

        let previous_content = prompt.content.clone();
        patch.apply_to(&mut prompt);
        let content_changed = prompt.content != previous_content;

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "UPDATE prompts SET title = ?, description = ?, content = ?, tags = ?, is_archived = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&prompt.title)
        .bind(&prompt.description)
        .bind(&prompt.content)
        .bind(tags_json(&prompt.tags)?)
        .bind(prompt.is_archived)
        .bind(prompt.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if content_changed {
            let next: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(version_number), 0) + 1 FROM prompt_versions WHERE prompt_id = ?",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO prompt_versions (prompt_id, version_number, content, change_note, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(next)
            .bind(&prompt.content)
            .bind(change_note)
            .bind(prompt.updated_at)
            .execute(&mut *tx)
            .await?;

            prompt.versions.push(PromptVersion {
                version_number: next,
                timestamp:      prompt.updated_at,
                change_note:    change_note.map(String::from),
            });
        }

        tx.commit().await?;

        Ok(Some(prompt))
    }

    pub async fn archive_prompt(&self, id: &str) -> Result<Option<Prompt>> {
        self.set_archived(id, true).await
    }

    pub async fn restore_prompt(&self, id: &str) -> Result<Option<Prompt>> {
        self.set_archived(id, false).await
    }

    /// Permanently remove a prompt and its history. Returns whether a row existed.
    pub async fn delete_prompt(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM prompt_versions WHERE prompt_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM prompts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_archived(&self, id: &str, archived: bool) -> Result<Option<Prompt>> {
        let patch = PromptPatch {
            is_archived: Some(archived),
            ..Default::default()
        };
        self.update_prompt(id, &patch, None).await
    }
}
