//! Document compilation: front-matter, metadata coercion, URL derivation.
//!
//! A content document is a UTF-8 markdown file with an optional leading
//! YAML front-matter block fenced by `---`:
//!
//! ```text
//! ---
//! title: Hello
//! date: 2024-03-05
//! layout: post
//! tags: [rust, blogging]
//! ---
//! Body in **markdown**.
//! ```
//!
//! Front-matter failures are never fatal to a build: a malformed block is
//! reported and the whole file is treated as body with empty metadata, so
//! one broken document cannot take the rest of the site down.
//!
//! ## URL derivation
//!
//! The output URL is derived from the document's location and always
//! overwrites any explicit `url` in front-matter (the historical behavior —
//! derivation runs unconditionally):
//!
//! - under `content/posts/` → `/posts/<slug>`
//! - stem `index`           → `/`
//! - anything else          → `/<slug>`
//!
//! ## Loose typing
//!
//! Front-matter values arrive loosely typed (`draft: true`, `draft: "yes"`,
//! `date: 2024-03-05`, `date: "2024-3-5"`). All such reads go through one
//! coercion point, [`Scalar`], instead of ad hoc type checks in render
//! logic.

use crate::config::SitePaths;
use crate::markdown;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Front-matter delimiter.
const FENCE: &str = "---";

/// A loosely-typed metadata scalar, the single coercion point for fields
/// that accept booleans, strings or numbers interchangeably.
pub(crate) enum Scalar<'a> {
    Bool(bool),
    Text(Cow<'a, str>),
    Absent,
}

pub(crate) fn scalar(value: Option<&Value>) -> Scalar<'_> {
    match value {
        None | Some(Value::Null) => Scalar::Absent,
        Some(Value::Bool(b)) => Scalar::Bool(*b),
        Some(Value::String(s)) => Scalar::Text(Cow::Borrowed(s)),
        Some(Value::Number(n)) => Scalar::Text(Cow::Owned(n.to_string())),
        Some(_) => Scalar::Absent,
    }
}

/// Parsed front-matter with typed accessors over the raw mapping.
///
/// The mapping is handed to templates verbatim as the `page` variable, so
/// user-defined fields survive untouched.
#[derive(Debug, Clone)]
pub struct PageMeta {
    data: Map<String, Value>,
}

impl PageMeta {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Derived URL; always set by [`compile`].
    pub fn url(&self) -> &str {
        self.get("url").and_then(Value::as_str).unwrap_or("/")
    }

    pub fn layout(&self) -> Option<&str> {
        self.get("layout").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title").and_then(Value::as_str)
    }

    /// Draft flag: boolean true, or `"true"` / `"1"` / `"yes"`
    /// (case-insensitive) in any scalar spelling.
    pub fn draft(&self) -> bool {
        match scalar(self.get("draft")) {
            Scalar::Bool(b) => b,
            Scalar::Text(s) => {
                matches!(
                    s.trim().to_ascii_lowercase().as_str(),
                    "true" | "1" | "yes"
                )
            }
            Scalar::Absent => false,
        }
    }

    /// Normalized date string, when present and string-like.
    pub fn date(&self) -> Option<String> {
        match scalar(self.get("date")) {
            Scalar::Text(s) => Some(s.into_owned()),
            _ => None,
        }
    }

    /// Tag list. A lone string counts as a single tag; anything else
    /// contributes nothing.
    pub fn tags(&self) -> Vec<String> {
        match self.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

/// A compiled document: normalized metadata plus the rendered body fragment.
#[derive(Debug, Clone)]
pub struct CompiledPage {
    pub meta: PageMeta,
    pub html: String,
    /// Bare file stem; the change-tracking slug is derived from this by the
    /// assembler (posts get a `posts/` prefix).
    pub stem: String,
}

/// Compile one source document.
///
/// Splits front-matter from body, converts the body to HTML, derives the
/// canonical URL from the document's location and normalizes the `date`
/// field. Front-matter errors are reported and recovered; only a missing or
/// unreadable file is an error (the caller skips that document).
pub fn compile(path: &Path, paths: &SitePaths) -> Result<CompiledPage, CompileError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CompileError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(CompileError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let (data, body) = split_front_matter(&raw, path);
    let html = markdown::convert(body);
    let mut meta = PageMeta::new(data);

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let url = if path.starts_with(paths.posts_dir()) {
        format!("/posts/{stem}")
    } else if stem == "index" {
        "/".to_string()
    } else {
        format!("/{stem}")
    };
    meta.insert("url", Value::String(url));

    normalize_date(&mut meta);

    Ok(CompiledPage { meta, html, stem })
}

/// Split an optional leading front-matter block from the body.
///
/// Any failure — missing closing fence, YAML error, non-mapping document —
/// is reported to stderr and the entire file becomes the body.
fn split_front_matter<'a>(raw: &'a str, path: &Path) -> (Map<String, Value>, &'a str) {
    if !raw.starts_with(FENCE) {
        return (Map::new(), raw);
    }

    let rest = &raw[FENCE.len()..];
    let Some(offset) = rest.find(FENCE) else {
        eprintln!(
            "Error parsing YAML frontmatter in {}: missing closing `---`",
            path.display()
        );
        return (Map::new(), raw);
    };

    let yaml = &rest[..offset];
    let body = &rest[offset + FENCE.len()..];

    match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
        Ok(parsed) => match crate::config::yaml_to_json(parsed) {
            Value::Object(map) => (map, body),
            Value::Null => (Map::new(), body),
            _ => {
                eprintln!(
                    "Error parsing YAML frontmatter in {}: expected a mapping",
                    path.display()
                );
                (Map::new(), raw)
            }
        },
        Err(e) => {
            eprintln!(
                "Error parsing YAML frontmatter in {}: {e}",
                path.display()
            );
            (Map::new(), raw)
        }
    }
}

/// Normalize the `date` field to canonical `YYYY-MM-DD`.
///
/// Accepts ISO-parseable date and datetime strings (unpadded components
/// included). Unparseable values are left exactly as they were.
fn normalize_date(meta: &mut PageMeta) {
    let Scalar::Text(raw) = scalar(meta.get("date")) else {
        return;
    };
    if let Some(canonical) = parse_iso_date(raw.trim()) {
        meta.insert("date", Value::String(canonical));
    }
}

fn parse_iso_date(s: &str) -> Option<String> {
    if let Ok(date) = s.parse::<NaiveDate>() {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = s.parse::<NaiveDateTime>() {
        return Some(dt.date().format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    None
}

/// Sort key for chronological post ordering: parsed date, or the minimum
/// date so undated posts sort as oldest.
pub fn date_sort_key(meta: &Value) -> NaiveDate {
    meta.get("date")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn site() -> (TempDir, SitePaths) {
        let tmp = TempDir::new().unwrap();
        let paths = SitePaths::new(tmp.path());
        fs::create_dir_all(paths.posts_dir()).unwrap();
        (tmp, paths)
    }

    fn write_doc(paths: &SitePaths, rel: &str, content: &str) -> std::path::PathBuf {
        let path = paths.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    // =========================================================================
    // Front-matter splitting
    // =========================================================================

    #[test]
    fn front_matter_parsed_and_body_converted() {
        let (_tmp, paths) = site();
        let path = write_doc(
            &paths,
            "content/about.md",
            "---\ntitle: About\nlayout: page\n---\n# Hi\n",
        );

        let page = compile(&path, &paths).unwrap();
        assert_eq!(page.meta.title(), Some("About"));
        assert_eq!(page.meta.layout(), Some("page"));
        assert!(page.html.contains("<h1>"));
    }

    #[test]
    fn file_without_front_matter_is_all_body() {
        let (_tmp, paths) = site();
        let path = write_doc(&paths, "content/plain.md", "just text\n");

        let page = compile(&path, &paths).unwrap();
        assert!(page.meta.title().is_none());
        assert!(page.html.contains("just text"));
    }

    #[test]
    fn malformed_front_matter_degrades_to_full_body() {
        let (_tmp, paths) = site();
        let path = write_doc(
            &paths,
            "content/broken.md",
            "---\ntitle: [unclosed\n---\nbody\n",
        );

        let page = compile(&path, &paths).unwrap();
        assert!(page.meta.title().is_none());
        // Recovery keeps the entire file as body, fences included
        assert!(page.html.contains("title"));
    }

    #[test]
    fn missing_closing_fence_degrades_to_full_body() {
        let (_tmp, paths) = site();
        let path = write_doc(&paths, "content/open.md", "---\ntitle: x\nno closing");

        let page = compile(&path, &paths).unwrap();
        assert!(page.meta.title().is_none());
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_tmp, paths) = site();
        let result = compile(&paths.content_dir().join("ghost.md"), &paths);
        assert!(matches!(result, Err(CompileError::NotFound(_))));
    }

    // =========================================================================
    // URL derivation
    // =========================================================================

    #[test]
    fn post_documents_get_posts_prefix() {
        let (_tmp, paths) = site();
        let path = write_doc(&paths, "content/posts/hello.md", "---\ntitle: H\n---\nx");
        let page = compile(&path, &paths).unwrap();
        assert_eq!(page.meta.url(), "/posts/hello");
    }

    #[test]
    fn index_maps_to_root() {
        let (_tmp, paths) = site();
        let path = write_doc(&paths, "content/index.md", "home");
        let page = compile(&path, &paths).unwrap();
        assert_eq!(page.meta.url(), "/");
    }

    #[test]
    fn top_level_page_maps_to_slug() {
        let (_tmp, paths) = site();
        let path = write_doc(&paths, "content/about.md", "about");
        let page = compile(&path, &paths).unwrap();
        assert_eq!(page.meta.url(), "/about");
    }

    #[test]
    fn explicit_url_is_overwritten_by_derivation() {
        let (_tmp, paths) = site();
        let path = write_doc(
            &paths,
            "content/about.md",
            "---\nurl: /custom/place\n---\nx",
        );
        let page = compile(&path, &paths).unwrap();
        assert_eq!(page.meta.url(), "/about");
    }

    // =========================================================================
    // Date normalization
    // =========================================================================

    #[test]
    fn unpadded_iso_date_normalized() {
        let (_tmp, paths) = site();
        let path = write_doc(&paths, "content/p.md", "---\ndate: 2024-3-5\n---\nx");
        let page = compile(&path, &paths).unwrap();
        assert_eq!(page.meta.get("date").unwrap(), "2024-03-05");
    }

    #[test]
    fn datetime_truncated_to_date() {
        let (_tmp, paths) = site();
        let path = write_doc(
            &paths,
            "content/p.md",
            "---\ndate: \"2024-03-05T10:30:00\"\n---\nx",
        );
        let page = compile(&path, &paths).unwrap();
        assert_eq!(page.meta.get("date").unwrap(), "2024-03-05");
    }

    #[test]
    fn unparseable_date_left_untouched() {
        let (_tmp, paths) = site();
        let path = write_doc(&paths, "content/p.md", "---\ndate: someday soon\n---\nx");
        let page = compile(&path, &paths).unwrap();
        assert_eq!(page.meta.get("date").unwrap(), "someday soon");
    }

    #[test]
    fn canonical_date_unchanged() {
        let (_tmp, paths) = site();
        let path = write_doc(&paths, "content/p.md", "---\ndate: 2023-12-31\n---\nx");
        let page = compile(&path, &paths).unwrap();
        assert_eq!(page.meta.get("date").unwrap(), "2023-12-31");
    }

    // =========================================================================
    // Draft coercion
    // =========================================================================

    #[test]
    fn draft_accepts_loose_spellings() {
        for (yaml, expected) in [
            ("draft: true", true),
            ("draft: \"true\"", true),
            ("draft: \"1\"", true),
            ("draft: 1", true),
            ("draft: YES", true),
            ("draft: false", false),
            ("draft: \"no\"", false),
            ("draft: 0", false),
        ] {
            let meta = PageMeta::new(match crate::config::yaml_to_json(
                serde_yaml::from_str(yaml).unwrap(),
            ) {
                Value::Object(m) => m,
                _ => unreachable!(),
            });
            assert_eq!(meta.draft(), expected, "case: {yaml}");
        }
    }

    #[test]
    fn absent_draft_is_false() {
        let meta = PageMeta::new(Map::new());
        assert!(!meta.draft());
    }

    // =========================================================================
    // Tags
    // =========================================================================

    #[test]
    fn tags_list_collected() {
        let mut meta = PageMeta::new(Map::new());
        meta.insert("tags", serde_json::json!(["rust", "blog"]));
        assert_eq!(meta.tags(), vec!["rust", "blog"]);
    }

    #[test]
    fn lone_string_tag_promoted() {
        let mut meta = PageMeta::new(Map::new());
        meta.insert("tags", Value::String("rust".into()));
        assert_eq!(meta.tags(), vec!["rust"]);
    }

    #[test]
    fn missing_tags_empty() {
        let meta = PageMeta::new(Map::new());
        assert!(meta.tags().is_empty());
    }

    // =========================================================================
    // Sort keys
    // =========================================================================

    #[test]
    fn undated_posts_sort_oldest() {
        let dated = serde_json::json!({"date": "2024-01-01"});
        let undated = serde_json::json!({"title": "x"});
        assert!(date_sort_key(&dated) > date_sort_key(&undated));
    }
}
