//! Prompt data model
//!
//! A [`Prompt`] is the unit both backends store. Timestamps are epoch
//! milliseconds. Tags are kept normalized: trimmed, deduplicated
//! case-insensitively and sorted for display.

use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One entry of a prompt's version history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptVersion {
    pub version_number: i64,
    pub timestamp:      i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_note:    Option<String>,
}

/// A stored prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id:          String,
    pub title:       String,
    pub description: String,
    pub content:     String,
    pub tags:        Vec<String>,
    pub created_at:  i64,
    pub updated_at:  i64,
    pub is_archived: bool,
    /// Always empty for prompts read from a directory
    #[serde(default)]
    pub versions:    Vec<PromptVersion>,
    /// Lookup hint for directory-backed prompts. Not authoritative: re-resolve
    /// by scanning for the id when absent or stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path:   Option<PathBuf>,
}

impl Prompt {
    /// Case-insensitive tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        let needle = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == needle)
    }

    /// Tags sorted by lowercase value
    pub fn sorted_tags(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        tags.sort_by_key(|t| t.to_lowercase());
        tags
    }
}

/// Input for creating a prompt
///
/// `id` and the timestamps are only set when mirroring an existing prompt
/// into another backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrompt {
    #[serde(default)]
    pub id:          Option<String>,
    pub title:       String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content:     String,
    #[serde(default)]
    pub tags:        Vec<String>,
    #[serde(default)]
    pub created_at:  Option<i64>,
    #[serde(default)]
    pub updated_at:  Option<i64>,
    #[serde(default)]
    pub is_archived: bool,
}

impl NewPrompt {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Mirror of an existing prompt, keeping its identity and timestamps
    pub fn from_prompt(prompt: &Prompt) -> Self {
        Self {
            id:          Some(prompt.id.clone()),
            title:       prompt.title.clone(),
            description: prompt.description.clone(),
            content:     prompt.content.clone(),
            tags:        prompt.tags.clone(),
            created_at:  Some(prompt.created_at),
            updated_at:  Some(prompt.updated_at),
            is_archived: prompt.is_archived,
        }
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPatch {
    #[serde(default)]
    pub title:       Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content:     Option<String>,
    #[serde(default)]
    pub tags:        Option<Vec<String>>,
    #[serde(default)]
    pub is_archived: Option<bool>,
    /// Explicit timestamp, used when replaying a mutation on the replica
    #[serde(default)]
    pub updated_at:  Option<i64>,
}

impl PromptPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.is_archived.is_none()
    }

    /// Apply the patch to a prompt, keeping `updated_at` non-decreasing
    pub fn apply_to(&self, prompt: &mut Prompt) {
        if let Some(title) = &self.title {
            prompt.title = title.clone();
        }
        if let Some(description) = &self.description {
            prompt.description = description.clone();
        }
        if let Some(content) = &self.content {
            prompt.content = content.clone();
        }
        if let Some(tags) = &self.tags {
            prompt.tags = normalize_tags(tags);
        }
        if let Some(archived) = self.is_archived {
            prompt.is_archived = archived;
        }
        let stamp = self.updated_at.unwrap_or_else(now_millis);
        prompt.updated_at = prompt.updated_at.max(stamp);
    }
}

/// Immutable point-in-time read of the whole collection from one backend
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    prompts: Arc<Vec<Prompt>>,
}

impl Snapshot {
    pub fn new(prompts: Vec<Prompt>) -> Self {
        Self {
            prompts: Arc::new(prompts),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Prompt> {
        self.prompts.iter()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Prompt> {
        self.prompts.as_ref().clone()
    }
}

impl From<Vec<Prompt>> for Snapshot {
    fn from(prompts: Vec<Prompt>) -> Self {
        Snapshot::new(prompts)
    }
}

/// Trim, drop empties, deduplicate case-insensitively (first spelling wins)
/// and sort by lowercase value.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if out.iter().any(|t| t.to_lowercase() == tag.to_lowercase()) {
            continue;
        }
        out.push(tag.to_string());
    }
    out.sort_by_key(|t| t.to_lowercase());
    out
}

/// Sort newest first
pub fn sort_by_updated_desc(prompts: &mut [Prompt]) {
    prompts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(id: &str, updated_at: i64) -> Prompt {
        Prompt {
            id:          id.to_string(),
            title:       format!("Prompt {}", id),
            description: String::new(),
            content:     "body".to_string(),
            tags:        vec![],
            created_at:  0,
            updated_at,
            is_archived: false,
            versions:    vec![],
            file_path:   None,
        }
    }

    #[test]
    fn test_normalize_tags_dedups_case_insensitively() {
        let tags = vec![
            "Rust".to_string(),
            " code ".to_string(),
            "rust".to_string(),
            "".to_string(),
            "Alpha".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["Alpha", "code", "Rust"]);
    }

    #[test]
    fn test_has_tag_ignores_case() {
        let mut p = prompt("a", 1);
        p.tags = vec!["Debug".to_string()];
        assert!(p.has_tag("debug"));
        assert!(p.has_tag("DEBUG"));
        assert!(!p.has_tag("deb"));
    }

    #[test]
    fn test_patch_keeps_updated_at_monotonic() {
        let mut p = prompt("a", i64::MAX - 1);
        PromptPatch::title("New").apply_to(&mut p);
        assert_eq!(p.title, "New");
        assert_eq!(p.updated_at, i64::MAX - 1);
    }

    #[test]
    fn test_patch_with_explicit_timestamp() {
        let mut p = prompt("a", 10);
        let patch = PromptPatch {
            content: Some("changed".into()),
            updated_at: Some(42),
            ..Default::default()
        };
        patch.apply_to(&mut p);
        assert_eq!(p.content, "changed");
        assert_eq!(p.updated_at, 42);
    }

    #[test]
    fn test_sort_by_updated_desc() {
        let mut prompts = vec![prompt("a", 1), prompt("b", 3), prompt("c", 2)];
        sort_by_updated_desc(&mut prompts);
        let ids: Vec<&str> = prompts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_prompt_serializes_camel_case() {
        let json = serde_json::to_string(&prompt("a", 1)).unwrap();
        assert!(json.contains("\"updatedAt\":"));
        assert!(json.contains("\"isArchived\":"));
        assert!(!json.contains("filePath"));
    }
}
