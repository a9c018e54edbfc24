//! Markdown prompt file codec
//!
//! ```text
//! ---
//! id: 7f0c...
//! title: Code review
//! description: Short summary
//! tags:
//! - code
//! created_at: 2024-05-01T10:00:00.000Z
//! updated_at: 2024-05-02T08:30:00.000Z
//! archived: false
//! ---
//!
//! Prompt body...
//! ```
//!
//! Only `id` and `title` are required. The filename carries no identity.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Result, VaultError},
    model::{normalize_tags, Prompt},
};

/// Longest filename stem produced by [`sanitize_filename`], in UTF-8 bytes.
/// Leaves room under the usual 255-byte name limit for the `-{id8}`
/// collision suffix, the extension and the `.{name}.tmp` write wrapper.
pub const MAX_STEM_BYTES: usize = 200;

pub const EXTENSION: &str = "md";

const DELIMITER: &str = "---";

#[derive(Debug, Deserialize)]
struct RawFrontmatter {
    id:          Option<String>,
    title:       Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags:        Option<Vec<String>>,
    #[serde(default)]
    created_at:  Option<serde_yaml::Value>,
    #[serde(default)]
    updated_at:  Option<serde_yaml::Value>,
    #[serde(default)]
    archived:    Option<bool>,
}

#[derive(Debug, Serialize)]
struct Frontmatter<'a> {
    id:          &'a str,
    title:       &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
    tags:        &'a [String],
    created_at:  String,
    updated_at:  String,
    archived:    bool,
}

/// Split `text` into (frontmatter, body). `None` when no frontmatter block.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');

    let first = lines.next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }

    let start = first.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            let yaml = &text[start..offset];
            let body = &text[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }

    None
}

fn timestamp_from_yaml(value: Option<&serde_yaml::Value>) -> Option<i64> {
    match value? {
        serde_yaml::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.timestamp_millis()),
        serde_yaml::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Epoch milliseconds as ISO-8601 (UTC, millisecond precision)
pub fn format_timestamp(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse one prompt file.
///
/// `fallback_time` stands in for missing or invalid timestamps.
pub fn parse_prompt(path: &Path, text: &str, fallback_time: i64) -> Result<Prompt> {
    let parse_error = |reason: &str| VaultError::Parse {
        path:   path.to_path_buf(),
        reason: reason.to_string(),
    };

    let (yaml, body) = split_frontmatter(text).ok_or_else(|| parse_error("missing frontmatter"))?;
    let raw: RawFrontmatter = serde_yaml::from_str(yaml).map_err(|e| parse_error(&e.to_string()))?;

    let id = raw
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| parse_error("missing id"))?;
    let title = raw
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| parse_error("missing title"))?;

    let created_at = timestamp_from_yaml(raw.created_at.as_ref()).unwrap_or(fallback_time);
    let updated_at = timestamp_from_yaml(raw.updated_at.as_ref()).unwrap_or(fallback_time);

    Ok(Prompt {
        id: id.trim().to_string(),
        title,
        description: raw.description.unwrap_or_default(),
        content: body.trim().to_string(),
        tags: normalize_tags(&raw.tags.unwrap_or_default()),
        created_at,
        updated_at,
        is_archived: raw.archived.unwrap_or(false),
        versions: Vec::new(),
        file_path: Some(path.to_path_buf()),
    })
}

/// Render a prompt as frontmatter + body
pub fn render_prompt(prompt: &Prompt) -> Result<String> {
    let frontmatter = Frontmatter {
        id:          &prompt.id,
        title:       &prompt.title,
        description: &prompt.description,
        tags:        &prompt.tags,
        created_at:  format_timestamp(prompt.created_at),
        updated_at:  format_timestamp(prompt.updated_at),
        archived:    prompt.is_archived,
    };

    let yaml = serde_yaml::to_string(&frontmatter)?;
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n\n{}\n", prompt.content.trim()))
}

/// Filename stem for a title: illegal characters stripped, whitespace
/// collapsed, length capped. Never empty.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated = truncate_bytes(&collapsed, MAX_STEM_BYTES);
    // Windows rejects trailing dots and spaces
    let trimmed = truncated.trim_end_matches(['.', ' ']).trim_start_matches('.');

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Longest prefix of `s` that fits in `max` bytes, cut on a char boundary
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Whether `path` looks like a prompt file
pub fn is_prompt_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EXTENSION))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn path() -> PathBuf {
        PathBuf::from("/prompts/test.md")
    }

    #[test]
    fn test_parse_full_file() {
        let text = "---\nid: abc\ntitle: Review\ndescription: Check code\ntags:\n  - Code\n  - ai\ncreated_at: 2024-05-01T10:00:00.000Z\nupdated_at: 2024-05-02T10:00:00Z\narchived: true\n---\n\n  Body text\n\n";
        let prompt = parse_prompt(&path(), text, 0).unwrap();

        assert_eq!(prompt.id, "abc");
        assert_eq!(prompt.title, "Review");
        assert_eq!(prompt.description, "Check code");
        assert_eq!(prompt.tags, vec!["ai", "Code"]);
        assert_eq!(prompt.content, "Body text");
        assert_eq!(prompt.created_at, 1_714_557_600_000);
        assert_eq!(prompt.updated_at, 1_714_644_000_000);
        assert!(prompt.is_archived);
        assert!(prompt.versions.is_empty());
        assert_eq!(prompt.file_path, Some(path()));
    }

    #[test]
    fn test_parse_missing_timestamps_use_fallback() {
        let text = "---\nid: abc\ntitle: T\n---\nbody";
        let prompt = parse_prompt(&path(), text, 777).unwrap();
        assert_eq!(prompt.created_at, 777);
        assert_eq!(prompt.updated_at, 777);
        assert_eq!(prompt.description, "");
        assert!(!prompt.is_archived);
    }

    #[test]
    fn test_parse_requires_id_and_title() {
        let no_id = "---\ntitle: T\n---\nbody";
        let no_title = "---\nid: x\n---\nbody";
        let no_frontmatter = "just some text";
        let unterminated = "---\nid: x\ntitle: T\nbody";

        for text in [no_id, no_title, no_frontmatter, unterminated] {
            let err = parse_prompt(&path(), text, 0).unwrap_err();
            assert_eq!(err.category(), "parse", "{text:?}");
        }
    }

    #[test]
    fn test_parse_handles_crlf() {
        let text = "---\r\nid: abc\r\ntitle: T\r\n---\r\n\r\nbody\r\n";
        let prompt = parse_prompt(&path(), text, 0).unwrap();
        assert_eq!(prompt.title, "T");
        assert_eq!(prompt.content, "body");
    }

    #[test]
    fn test_render_then_parse_preserves_fields() {
        let text = "---\nid: abc\ntitle: 'Weird: title'\ntags: [b, a]\ncreated_at: 2024-05-01T10:00:00.000Z\nupdated_at: 2024-05-01T10:00:00.000Z\n---\nbody";
        let prompt = parse_prompt(&path(), text, 0).unwrap();
        let rendered = render_prompt(&prompt).unwrap();

        assert!(rendered.starts_with("---\nid: abc\n"));
        let reparsed = parse_prompt(&path(), &rendered, 0).unwrap();
        assert_eq!(reparsed, prompt);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello: World?"), "Hello World");
        assert_eq!(sanitize_filename("  many   spaces\there "), "many spaces here");
        assert_eq!(sanitize_filename("a/b\\c"), "abc");
        assert_eq!(sanitize_filename("???"), "untitled");
        assert_eq!(sanitize_filename("trailing dots..."), "trailing dots");

        let long = "x".repeat(250);
        assert_eq!(sanitize_filename(&long).len(), MAX_STEM_BYTES);
    }

    #[test]
    fn test_sanitize_filename_caps_multibyte_titles_by_bytes() {
        // 3 bytes per char: 270 bytes in, 66 whole chars out
        let cjk = sanitize_filename(&"日".repeat(90));
        assert_eq!(cjk.len(), 198);
        assert!(cjk.chars().all(|c| c == '日'));

        let emoji = sanitize_filename(&"🦀".repeat(80));
        assert_eq!(emoji.len(), MAX_STEM_BYTES);
        assert_eq!(emoji.chars().count(), 50);
    }

    #[test]
    fn test_is_prompt_file() {
        assert!(is_prompt_file(Path::new("/a/b.md")));
        assert!(is_prompt_file(Path::new("/a/b.MD")));
        assert!(!is_prompt_file(Path::new("/a/b.txt")));
        assert!(!is_prompt_file(Path::new("/a/.b.md.tmp")));
    }
}
