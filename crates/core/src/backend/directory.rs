use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::UNIX_EPOCH,
};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use super::{
    markdown::{self, is_prompt_file, parse_prompt, render_prompt, sanitize_filename},
    Backend, BackendKind,
};
use crate::{
    errors::{Result, VaultError},
    model::{normalize_tags, now_millis, sort_by_updated_desc, NewPrompt, Prompt, PromptPatch},
};

/// Markdown folder backend (non-recursive)
///
/// Remembers where each id was last seen; a remembered path is only a hint
/// and is verified before use.
#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    root:  PathBuf,
    hints: Arc<Mutex<HashMap<String, PathBuf>>>,
}

impl DirectoryBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root:  root.into(),
            hints: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current path of the file holding `id`. A remembered path is tried
    /// first, then the folder is scanned.
    pub async fn resolve_file_path(&self, id: &str) -> Result<Option<PathBuf>> {
        Ok(self.locate(id, None).await?.map(|(path, _)| path))
    }

    /// Find the file holding `id`, trying `hint` before a full scan
    pub async fn locate(&self, id: &str, hint: Option<&Path>) -> Result<Option<(PathBuf, Prompt)>> {
        let hint = hint.map(Path::to_path_buf).or_else(|| self.hint(id));
        if let Some(hint) = hint {
            if let Some(prompt) = read_prompt_file(&hint).await {
                if prompt.id == id {
                    return Ok(Some((hint, prompt)));
                }
            }
        }

        for path in self.list_files().await? {
            if let Some(prompt) = read_prompt_file(&path).await {
                if prompt.id == id {
                    self.remember(id, &path);
                    return Ok(Some((path, prompt)));
                }
            }
        }

        self.forget(id);
        Ok(None)
    }

    fn hint(&self, id: &str) -> Option<PathBuf> {
        self.hints.lock().ok()?.get(id).cloned()
    }

    fn remember(&self, id: &str, path: &Path) {
        if let Ok(mut hints) = self.hints.lock() {
            hints.insert(id.to_string(), path.to_path_buf());
        }
    }

    fn forget(&self, id: &str) {
        if let Ok(mut hints) = self.hints.lock() {
            hints.remove(id);
        }
    }

    async fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| VaultError::access(&self.root, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VaultError::access(&self.root, e))?
        {
            let path = entry.path();
            if !is_prompt_file(&path) {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_file() => files.push(path),
                _ => continue,
            }
        }

        files.sort();
        Ok(files)
    }

    /// Destination for a prompt titled `title`. Falls back to an id-suffixed
    /// name when another prompt already owns the sanitized one.
    async fn target_path(&self, title: &str, id: &str) -> PathBuf {
        let stem = sanitize_filename(title);
        let candidate = self.root.join(format!("{}.{}", stem, markdown::EXTENSION));

        if !path_exists(&candidate).await {
            return candidate;
        }
        match read_prompt_file(&candidate).await {
            Some(existing) if existing.id == id => candidate,
            _ => {
                let short: String = id.chars().take(8).collect();
                self.root.join(format!("{}-{}.{}", stem, short, markdown::EXTENSION))
            },
        }
    }

    /// Write `prompt` to `path` via a sibling temp file and rename
    async fn write_file(&self, path: &Path, prompt: &Prompt) -> Result<()> {
        let text = render_prompt(prompt)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "prompt".to_string());
        let tmp = path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&tmp, text).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Persist `prompt`, currently stored at `old_path`. The new file is
    /// written before the old one is removed, and the old one is kept when
    /// both names lead to the same file.
    async fn store(&self, old_path: &Path, old_title: &str, mut prompt: Prompt) -> Result<Prompt> {
        let new_path = if sanitize_filename(old_title) == sanitize_filename(&prompt.title) {
            old_path.to_path_buf()
        } else {
            self.target_path(&prompt.title, &prompt.id).await
        };

        if new_path != old_path && is_case_variant(old_path, &new_path) {
            // On case-insensitive filesystems both names are one file
            self.write_file(old_path, &prompt).await?;
            fs::rename(old_path, &new_path).await?;
        } else {
            self.write_file(&new_path, &prompt).await?;
            if new_path != old_path && !same_file(old_path, &new_path).await {
                match fs::remove_file(old_path).await {
                    Ok(()) => {},
                    Err(e) if e.kind() == ErrorKind::NotFound => {},
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if new_path != old_path {
            tracing::debug!(
                id = %prompt.id,
                from = %old_path.display(),
                to = %new_path.display(),
                "renamed prompt file"
            );
        }

        self.remember(&prompt.id, &new_path);
        prompt.file_path = Some(new_path);
        Ok(prompt)
    }

    async fn set_archived(&self, id: &str, archived: bool) -> Result<Option<Prompt>> {
        let Some((path, mut prompt)) = self.locate(id, None).await? else {
            return Ok(None);
        };

        prompt.is_archived = archived;
        prompt.updated_at = prompt.updated_at.max(now_millis());
        self.write_file(&path, &prompt).await?;
        prompt.file_path = Some(path);
        Ok(Some(prompt))
    }
}

#[async_trait]
impl Backend for DirectoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Directory
    }

    /// Unparseable files and files without `id`/`title` are skipped. When
    /// two files carry the same id (mid-rename) the newer one wins.
    async fn load_all(&self) -> Result<Vec<Prompt>> {
        let mut prompts = Vec::new();
        for path in self.list_files().await? {
            if let Some(prompt) = read_prompt_file(&path).await {
                prompts.push(prompt);
            }
        }
        sort_by_updated_desc(&mut prompts);

        let mut seen = HashSet::new();
        prompts.retain(|p| seen.insert(p.id.clone()));
        for prompt in &prompts {
            if let Some(path) = &prompt.file_path {
                self.remember(&prompt.id, path);
            }
        }
        Ok(prompts)
    }

    async fn create(&self, data: &NewPrompt) -> Result<Prompt> {
        let now = now_millis();
        let id = data.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let created_at = data.created_at.unwrap_or(now);

        let prompt = Prompt {
            id: id.clone(),
            title: data.title.clone(),
            description: data.description.clone(),
            content: data.content.trim().to_string(),
            tags: normalize_tags(&data.tags),
            created_at,
            updated_at: data.updated_at.unwrap_or(created_at),
            is_archived: data.is_archived,
            versions: Vec::new(),
            file_path: None,
        };

        if data.id.is_some() {
            if let Some((path, existing)) = self.locate(&id, None).await? {
                return self.store(&path, &existing.title, prompt).await;
            }
        }

        let path = self.target_path(&prompt.title, &prompt.id).await;
        self.write_file(&path, &prompt).await?;
        self.remember(&id, &path);

        Ok(Prompt {
            file_path: Some(path),
            ..prompt
        })
    }

    async fn update(
        &self,
        id: &str,
        patch: &PromptPatch,
        _change_note: Option<&str>,
    ) -> Result<Option<Prompt>> {
        let Some((path, mut prompt)) = self.locate(id, None).await? else {
            return Ok(None);
        };

        let old_title = prompt.title.clone();
        patch.apply_to(&mut prompt);
        prompt.content = prompt.content.trim().to_string();

        self.store(&path, &old_title, prompt).await.map(Some)
    }

    async fn archive(&self, id: &str) -> Result<Option<Prompt>> {
        self.set_archived(id, true).await
    }

    async fn restore(&self, id: &str) -> Result<Option<Prompt>> {
        self.set_archived(id, false).await
    }

    /// Hard delete
    async fn delete(&self, id: &str) -> Result<bool> {
        let Some((path, _)) = self.locate(id, None).await? else {
            return Ok(false);
        };

        self.forget(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Same folder, names equal up to case
fn is_case_variant(a: &Path, b: &Path) -> bool {
    match (a.file_name(), b.file_name()) {
        (Some(x), Some(y)) if x != y && a.parent() == b.parent() => {
            x.to_string_lossy().to_lowercase() == y.to_string_lossy().to_lowercase()
        },
        _ => false,
    }
}

/// Whether `a` and `b` currently name the same file on disk
async fn same_file(a: &Path, b: &Path) -> bool {
    match (file_identity(a).await, file_identity(b).await) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(unix)]
async fn file_identity(path: &Path) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    let meta = fs::metadata(path).await.ok()?;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
async fn file_identity(path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path).await.ok()
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn modified_millis(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).await.ok()?.modified().ok()?;
    let millis = modified.duration_since(UNIX_EPOCH).ok()?.as_millis();
    i64::try_from(millis).ok()
}

/// Read and parse one file; failures are logged and yield `None`
async fn read_prompt_file(path: &Path) -> Option<Prompt> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "skipping unreadable prompt file");
            return None;
        },
    };

    let fallback = modified_millis(path).await.unwrap_or_else(now_millis);
    match parse_prompt(path, &text, fallback) {
        Ok(prompt) => Some(prompt),
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed prompt file");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn new_prompt(title: &str) -> NewPrompt {
        NewPrompt {
            title: title.to_string(),
            description: "desc".to_string(),
            content: "content".to_string(),
            tags: vec!["b".to_string(), "a".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_writes_sanitized_filename() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());

        let prompt = backend.create(&new_prompt("Fix: the bug?")).await.unwrap();
        let expected = dir.path().join("Fix the bug.md");

        assert_eq!(prompt.file_path.as_deref(), Some(expected.as_path()));
        assert!(expected.exists());
        assert_eq!(prompt.tags, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_filename_collision_gets_id_suffix() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());

        let first = backend.create(&new_prompt("Same")).await.unwrap();
        let second = backend.create(&new_prompt("Same")).await.unwrap();

        assert_ne!(first.file_path, second.file_path);
        let name = second.file_path.unwrap().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Same-"));
        assert_eq!(backend.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_content_keeps_path() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());
        let prompt = backend.create(&new_prompt("Stable")).await.unwrap();

        let patch = PromptPatch {
            content: Some("new body".into()),
            ..Default::default()
        };
        let updated = backend.update(&prompt.id, &patch, None).await.unwrap().unwrap();

        assert_eq!(updated.file_path, prompt.file_path);
        assert_eq!(updated.content, "new body");
        assert!(updated.updated_at >= prompt.updated_at);
    }

    #[tokio::test]
    async fn test_update_missing_old_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());

        assert!(backend.update("ghost", &PromptPatch::title("x"), None).await.unwrap().is_none());
        assert!(!backend.delete("ghost").await.unwrap());
        assert!(backend.archive("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_locate_uses_valid_hint_and_ignores_stale_one() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());
        let a = backend.create(&new_prompt("Alpha")).await.unwrap();
        let b = backend.create(&new_prompt("Beta")).await.unwrap();

        let hinted = backend.locate(&a.id, a.file_path.as_deref()).await.unwrap().unwrap();
        assert_eq!(Some(hinted.0), a.file_path);

        // Hint pointing at another prompt's file falls back to a scan
        let stale = backend.locate(&a.id, b.file_path.as_deref()).await.unwrap().unwrap();
        assert_eq!(Some(stale.0), a.file_path);
    }

    #[tokio::test]
    async fn test_create_with_known_id_overwrites() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());
        let original = backend.create(&new_prompt("Original")).await.unwrap();

        let mut mirror = NewPrompt::from_prompt(&original);
        mirror.title = "Renamed".into();
        let replaced = backend.create(&mirror).await.unwrap();

        assert_eq!(replaced.id, original.id);
        assert!(!original.file_path.unwrap().exists());
        assert_eq!(backend.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_case_only_retitle_keeps_the_file() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());
        let prompt = backend.create(&new_prompt("notes")).await.unwrap();

        let renamed = backend
            .update(&prompt.id, &PromptPatch::title("Notes"), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(renamed.file_path, Some(dir.path().join("Notes.md")));
        let loaded = backend.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "Notes");
        assert_eq!(loaded[0].content, "content");
    }

    #[test]
    fn test_is_case_variant() {
        assert!(is_case_variant(Path::new("/p/notes.md"), Path::new("/p/Notes.md")));
        assert!(!is_case_variant(Path::new("/p/notes.md"), Path::new("/p/notes.md")));
        assert!(!is_case_variant(Path::new("/p/notes.md"), Path::new("/q/Notes.md")));
        assert!(!is_case_variant(Path::new("/p/notes.md"), Path::new("/p/other.md")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_same_file_follows_links_not_names() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.md");
        let b = dir.path().join("b.md");
        let alias = dir.path().join("alias.md");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();
        std::fs::hard_link(&a, &alias).unwrap();

        assert!(same_file(&a, &alias).await);
        assert!(!same_file(&a, &b).await);
        assert!(!same_file(&a, &dir.path().join("missing.md")).await);
    }

    #[tokio::test]
    async fn test_long_multibyte_title_is_created() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());

        let first = backend.create(&new_prompt(&"日".repeat(90))).await.unwrap();
        let second = backend.create(&new_prompt(&"日".repeat(90))).await.unwrap();

        assert_ne!(first.file_path, second.file_path);
        assert_eq!(backend.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_load_all_on_missing_directory_is_access_error() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path().join("nope"));

        let err = backend.load_all().await.unwrap_err();
        assert_eq!(err.category(), "access");
    }

    #[tokio::test]
    async fn test_load_all_ignores_non_markdown_and_temp_files() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());
        backend.create(&new_prompt("Real")).await.unwrap();

        std::fs::write(dir.path().join("notes.txt"), "---\nid: x\ntitle: T\n---\n").unwrap();
        std::fs::write(dir.path().join(".Real.md.tmp"), "---\nid: y\ntitle: T\n---\n").unwrap();
        std::fs::create_dir(dir.path().join("sub.md")).unwrap();

        assert_eq!(backend.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_the_newest_file() {
        let dir = TempDir::new().unwrap();
        let backend = DirectoryBackend::new(dir.path());

        std::fs::write(
            dir.path().join("old.md"),
            "---\nid: dup\ntitle: Old\nupdated_at: 2024-01-01T00:00:00Z\n---\nbody",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("new.md"),
            "---\nid: dup\ntitle: New\nupdated_at: 2024-06-01T00:00:00Z\n---\nbody",
        )
        .unwrap();

        let prompts = backend.load_all().await.unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].title, "New");
        assert_eq!(
            backend.resolve_file_path("dup").await.unwrap(),
            Some(dir.path().join("new.md"))
        );
    }
}
