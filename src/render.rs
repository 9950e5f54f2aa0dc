//! Template loading and page rendering.
//!
//! Templates live under `templates/` and are Jinja-style (Tera). A document
//! selects its template through the `layout` front-matter field; the loader
//! registers each template file under several lookup keys so `layout: post`,
//! `layout: post.html` and `layout: blog/post.html` all resolve:
//!
//! - the slash-normalized path relative to `templates/`
//! - that path minus its final extension
//! - the bare file stem
//!
//! Files are visited in sorted order and the first registration of a key
//! wins, so a top-level `post.html` shadows a nested `blog/post.jinja` for
//! the bare `post` key deterministically.
//!
//! Rendering builds the context (`site`, `page`, `content`, and `posts` for
//! the listing layout), expands the template, rewrites responsive images
//! over the final document and writes it to `<url>/index.html` under the
//! output root.

use crate::config::SitePaths;
use crate::page::CompiledPage;
use crate::rewrite::{self, ImageManifest};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("unknown layout '{layout}' (available: {available})")]
    UnknownLayout { layout: String, available: String },
    #[error("no layout declared for {0}")]
    MissingLayout(String),
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Template file extensions picked up by the loader.
const TEMPLATE_EXTENSIONS: [&str; 4] = ["html", "jinja", "jinja2", "j2"];

/// Loaded template set with layout-name resolution.
pub struct Templates {
    tera: Tera,
    keys: BTreeMap<String, String>,
}

impl Templates {
    /// Load every template under `templates/`.
    ///
    /// All files register in one pass so `{% extends %}` and `{% include %}`
    /// chains resolve regardless of discovery order. A missing or empty
    /// templates directory loads an empty set; the failure surfaces later as
    /// an unknown layout.
    pub fn load(paths: &SitePaths) -> Result<Self, RenderError> {
        let dir = paths.templates_dir();
        let mut files: Vec<(PathBuf, Option<String>)> = Vec::new();
        let mut keys = BTreeMap::new();

        for entry in WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !TEMPLATE_EXTENSIONS.contains(&ext) {
                continue;
            }

            let rel = path.strip_prefix(&dir).unwrap_or(path);
            let canonical = slash_normalized(rel);
            files.push((path.to_path_buf(), Some(canonical.clone())));

            for alias in lookup_keys(rel, &canonical) {
                keys.entry(alias).or_insert_with(|| canonical.clone());
            }
        }

        let mut tera = Tera::default();
        // Page bodies are already HTML fragments; templates receive them
        // as-is rather than entity-escaped.
        tera.autoescape_on(vec![]);
        tera.add_template_files(files)?;
        Ok(Self { tera, keys })
    }

    pub fn contains(&self, layout: &str) -> bool {
        self.keys.contains_key(layout)
    }

    /// Expand the template a layout name resolves to.
    pub fn render(&self, layout: &str, context: &Context) -> Result<String, RenderError> {
        let Some(name) = self.keys.get(layout) else {
            return Err(RenderError::UnknownLayout {
                layout: layout.to_string(),
                available: self.keys.keys().cloned().collect::<Vec<_>>().join(", "),
            });
        };
        Ok(self.tera.render(name, context)?)
    }
}

fn slash_normalized(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn lookup_keys(rel: &Path, canonical: &str) -> Vec<String> {
    let mut keys = vec![canonical.to_string()];
    if let Some((without_ext, _)) = canonical.rsplit_once('.') {
        keys.push(without_ext.to_string());
    }
    if let Some(stem) = rel.file_stem().map(|s| s.to_string_lossy().into_owned()) {
        keys.push(stem);
    }
    keys.dedup();
    keys
}

/// Render one compiled document and write it to its output location.
///
/// `posts` is provided only when the layout wants the chronological listing.
/// Responsive images are rewritten over the fully expanded document, so
/// images referenced by the template itself are covered too.
pub fn render_page(
    templates: &Templates,
    page: &CompiledPage,
    site: &Value,
    posts: Option<&[Value]>,
    manifest: &ImageManifest,
    paths: &SitePaths,
) -> Result<PathBuf, RenderError> {
    let Some(layout) = page.meta.layout() else {
        return Err(RenderError::MissingLayout(page.meta.url().to_string()));
    };

    let mut context = Context::new();
    context.insert("site", site);
    context.insert("page", &page.meta.as_value());
    context.insert("content", &page.html);
    if let Some(posts) = posts {
        context.insert("posts", &posts);
    }

    let html = templates.render(layout, &context)?;
    let html = rewrite::rewrite_images(&html, manifest);

    let out = output_path(paths, page.meta.url());
    write_output(&out, &html)?;
    println!("Generated: {}", out.display());
    Ok(out)
}

/// Map a page URL to its output file: `/` lands at the root `index.html`,
/// everything else in a directory named after the URL.
pub fn output_path(paths: &SitePaths, url: &str) -> PathBuf {
    let trimmed = url.trim_matches('/');
    let mut out = paths.output_dir().to_path_buf();
    for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
        out.push(segment);
    }
    out.join("index.html")
}

pub(crate) fn write_output(path: &Path, contents: &str) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })
}
