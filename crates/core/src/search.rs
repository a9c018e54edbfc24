//! Search index seam
//!
//! The engine keeps an index current after every accepted mutation or
//! reconciliation. [`MemoryIndex`] is a small case-insensitive substring
//! index used by default.

use std::{collections::HashMap, sync::RwLock};

use crate::model::Prompt;

pub trait SearchIndex: Send + Sync {
    /// Rebuild from scratch
    fn index_all(&self, prompts: &[Prompt]);

    fn add_one(&self, prompt: &Prompt);

    fn remove_one(&self, id: &str);

    /// Ids matching `query`, best first. `None` when the index cannot answer queries.
    fn search(&self, _query: &str) -> Option<Vec<String>> {
        None
    }
}

#[derive(Debug, Default)]
pub struct MemoryIndex {
    docs: RwLock<HashMap<String, IndexedDoc>>,
}

#[derive(Debug, Clone)]
struct IndexedDoc {
    title:      String,
    body:       String,
    updated_at: i64,
}

impl IndexedDoc {
    fn from_prompt(prompt: &Prompt) -> Self {
        Self {
            title:      prompt.title.to_lowercase(),
            body:       format!(
                "{}\n{}\n{}",
                prompt.description.to_lowercase(),
                prompt.content.to_lowercase(),
                prompt.tags.join(" ").to_lowercase()
            ),
            updated_at: prompt.updated_at,
        }
    }
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SearchIndex for MemoryIndex {
    fn index_all(&self, prompts: &[Prompt]) {
        let docs = prompts
            .iter()
            .map(|p| (p.id.clone(), IndexedDoc::from_prompt(p)))
            .collect();
        if let Ok(mut guard) = self.docs.write() {
            *guard = docs;
        }
    }

    fn add_one(&self, prompt: &Prompt) {
        if let Ok(mut guard) = self.docs.write() {
            guard.insert(prompt.id.clone(), IndexedDoc::from_prompt(prompt));
        }
    }

    fn remove_one(&self, id: &str) {
        if let Ok(mut guard) = self.docs.write() {
            guard.remove(id);
        }
    }

    /// Title hits rank above body hits, then newest first
    fn search(&self, query: &str) -> Option<Vec<String>> {
        let needle = query.trim().to_lowercase();
        let guard = self.docs.read().ok()?;

        let mut hits: Vec<(u8, i64, &String)> = guard
            .iter()
            .filter_map(|(id, doc)| {
                if needle.is_empty() {
                    Some((1, doc.updated_at, id))
                } else if doc.title.contains(&needle) {
                    Some((0, doc.updated_at, id))
                } else if doc.body.contains(&needle) {
                    Some((1, doc.updated_at, id))
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(b.2)));
        Some(hits.into_iter().map(|(_, _, id)| id.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(id: &str, title: &str, content: &str, updated_at: i64) -> Prompt {
        Prompt {
            id:          id.into(),
            title:       title.into(),
            description: String::new(),
            content:     content.into(),
            tags:        vec!["Review".into()],
            created_at:  0,
            updated_at,
            is_archived: false,
            versions:    vec![],
            file_path:   None,
        }
    }

    #[test]
    fn test_search_ranks_title_hits_first() {
        let index = MemoryIndex::new();
        index.index_all(&[
            prompt("a", "Notes", "rust borrow checker", 5),
            prompt("b", "Rust tips", "short", 1),
        ]);

        assert_eq!(index.search("RUST").unwrap(), vec!["b", "a"]);
        assert_eq!(index.search("review").unwrap().len(), 2);
        assert!(index.search("python").unwrap().is_empty());
    }

    #[test]
    fn test_add_and_remove() {
        let index = MemoryIndex::new();
        index.add_one(&prompt("a", "One", "", 1));
        index.add_one(&prompt("a", "One again", "", 2));
        assert_eq!(index.len(), 1);

        index.remove_one("a");
        assert!(index.is_empty());
    }
}
