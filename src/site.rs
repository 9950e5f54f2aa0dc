//! Site assembly: discovery, incremental state, and build orchestration.
//!
//! A full build is a fixed sequence:
//!
//! 1. sweep previously generated output ([`crate::clean`])
//! 2. discover documents (`content/*.md`, then `content/posts/*.md`, each
//!    level sorted and non-recursive)
//! 3. compile every document, skipping drafts and reporting failures
//!    without aborting the build
//! 4. prune output directories for slugs that existed last build but not
//!    this one, then persist the current slug set
//! 5. render every page, the tag index pages, and the sitemap
//!
//! Posts are documents under `content/posts/` with `layout: post`; they are
//! offered to the listing layout (`layout: blog`) newest first. A
//! single-file build (`--file`) compiles and renders one document without
//! touching the rest of the site, and handles the deleted-file case by
//! pruning that document's output.

use crate::cache::{self, SlugCache};
use crate::clean;
use crate::config::{ConfigError, SiteConfig, SitePaths};
use crate::page::{self, CompiledPage};
use crate::render::{self, RenderError, Templates};
use crate::rewrite::{self, ImageManifest};
use crate::theme;
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tera::Context;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A loaded site: configuration, templates and image manifest, ready to
/// build any number of documents.
pub struct Site {
    config: SiteConfig,
    templates: Templates,
    manifest: ImageManifest,
    paths: SitePaths,
}

impl Site {
    /// Load a site rooted at `root`.
    ///
    /// Reads the configuration (required), regenerates the theme CSS from
    /// it, loads the template set and the image manifest.
    pub fn load(root: &Path) -> Result<Self, BuildError> {
        let paths = SitePaths::new(root);
        let config = SiteConfig::load(&paths)?;
        theme::write_theme_file(config.theme(), &paths.theme_css())?;
        let templates = Templates::load(&paths)?;
        let manifest = rewrite::load_manifest(&paths);
        Ok(Self {
            config,
            templates,
            manifest,
            paths,
        })
    }

    /// Build the whole site.
    pub fn build_site(&self) -> Result<(), BuildError> {
        clean::clean_output(&self.paths)?;

        let previous = SlugCache::load(&self.paths);
        let mut pages = Vec::new();
        let mut current = BTreeSet::new();

        for path in self.discover() {
            let page = match page::compile(&path, &self.paths) {
                Ok(page) => page,
                Err(e) => {
                    eprintln!("Error compiling {}: {e}", path.display());
                    continue;
                }
            };
            if page.meta.draft() {
                println!("Skipping draft: {}", path.display());
                continue;
            }
            current.insert(self.slug_for(&path, &page.stem));
            pages.push(page);
        }

        self.prune_stale(&previous, &current);
        SlugCache::save(&self.paths, &current)?;

        let site_value = self.config.as_value();
        let posts = posts_context(&pages);

        for page in &pages {
            let listing = page.meta.layout() == Some("blog");
            let posts_ctx = listing.then_some(posts.as_slice());
            if let Err(e) = render::render_page(
                &self.templates,
                page,
                &site_value,
                posts_ctx,
                &self.manifest,
                &self.paths,
            ) {
                eprintln!("Error rendering {}: {e}", page.meta.url());
            }
        }

        self.render_tag_pages(&pages, &site_value);
        self.render_sitemap(&pages, &site_value);
        Ok(())
    }

    /// Build one document, or prune its output if the file is gone.
    ///
    /// The content fingerprint is advisory: the change is reported, the
    /// document rebuilds either way. The slug set is only reconciled by
    /// full builds, so a deletion invalidates it outright.
    pub fn build_single(&self, file: &Path) -> Result<(), BuildError> {
        if !file.exists() {
            return self.remove_deleted(file);
        }

        match cache::fingerprint_changed(file, &self.paths) {
            Ok(true) => println!("Content changed: {}", file.display()),
            Ok(false) => println!("Content unchanged, rebuilding anyway: {}", file.display()),
            Err(e) => eprintln!("Warning: cannot fingerprint {}: {e}", file.display()),
        }

        let page = match page::compile(file, &self.paths) {
            Ok(page) => page,
            Err(e) => {
                eprintln!("Error compiling {}: {e}", file.display());
                return Ok(());
            }
        };
        if page.meta.draft() {
            println!("Skipping draft: {}", file.display());
            return Ok(());
        }

        render::render_page(
            &self.templates,
            &page,
            &self.config.as_value(),
            None,
            &self.manifest,
            &self.paths,
        )?;
        Ok(())
    }

    fn remove_deleted(&self, file: &Path) -> Result<(), BuildError> {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let slug = self.slug_for(file, &stem);

        // The root index.html is never pruned through the slug path.
        if slug != "index" {
            let dir = self.paths.output_dir().join(&slug);
            match fs::remove_dir_all(&dir) {
                Ok(()) => println!("Removed output for deleted page: {}", dir.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(BuildError::Io(e)),
            }
        }
        SlugCache::invalidate(&self.paths)?;
        Ok(())
    }

    /// Content documents in build order: top-level pages first, then posts,
    /// each group sorted by filename.
    fn discover(&self) -> Vec<PathBuf> {
        let mut docs = markdown_files(&self.paths.content_dir());
        docs.extend(markdown_files(&self.paths.posts_dir()));
        docs
    }

    /// Change-tracking slug for a document. Posts keep a `posts/` prefix so
    /// they never collide with top-level pages.
    fn slug_for(&self, path: &Path, stem: &str) -> String {
        if path.starts_with(self.paths.posts_dir()) {
            format!("posts/{stem}")
        } else {
            stem.to_string()
        }
    }

    /// Remove output directories for slugs that vanished since the last
    /// build. Post slugs and the root index are exempt.
    fn prune_stale(&self, previous: &BTreeSet<String>, current: &BTreeSet<String>) {
        for slug in previous.difference(current) {
            if slug.as_str() == "index" || slug.starts_with("posts/") {
                continue;
            }
            let dir = self.paths.output_dir().join(slug);
            match fs::remove_dir_all(&dir) {
                Ok(()) => println!("Removed stale page: {}", dir.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => eprintln!("Warning: cannot remove stale page {}: {e}", dir.display()),
            }
        }
    }

    /// One `tags/<tag>.html` page per tag, listing that tag's posts
    /// newest first.
    fn render_tag_pages(&self, pages: &[CompiledPage], site: &Value) {
        let mut index: BTreeMap<String, Vec<(NaiveDate, Value)>> = BTreeMap::new();
        for page in pages {
            if page.meta.layout() != Some("post") {
                continue;
            }
            let value = page.meta.as_value();
            let sort_key = page::date_sort_key(&value);
            for tag in page.meta.tags() {
                index.entry(tag).or_default().push((sort_key, value.clone()));
            }
        }
        if index.is_empty() {
            return;
        }
        if !self.templates.contains("tags") {
            eprintln!("Warning: no 'tags' template; skipping tag pages");
            return;
        }

        for (tag, mut entries) in index {
            entries.sort_by(|a, b| b.0.cmp(&a.0));
            let posts: Vec<Value> = entries.into_iter().map(|(_, value)| value).collect();
            let mut context = Context::new();
            context.insert("site", site);
            context.insert("tag_name", &tag);
            context.insert("posts", &posts);
            context.insert("page", &json!({"title": format!("Tag: {tag}")}));

            match self.templates.render("tags", &context) {
                Ok(html) => {
                    let html = rewrite::rewrite_images(&html, &self.manifest);
                    // Tag pages are flat files, not per-page directories
                    let out = self
                        .paths
                        .output_dir()
                        .join("tags")
                        .join(format!("{tag}.html"));
                    match render::write_output(&out, &html) {
                        Ok(()) => println!("Generated: {}", out.display()),
                        Err(e) => eprintln!("Error writing tag page '{tag}': {e}"),
                    }
                }
                Err(e) => eprintln!("Error rendering tag page '{tag}': {e}"),
            }
        }
    }

    fn render_sitemap(&self, pages: &[CompiledPage], site: &Value) {
        if !self.templates.contains("sitemap.xml") {
            eprintln!("Warning: no 'sitemap.xml' template; skipping sitemap");
            return;
        }

        let urls: Vec<&str> = pages.iter().map(|p| p.meta.url()).collect();
        let mut context = Context::new();
        context.insert("site", site);
        context.insert("pages", &urls);

        match self.templates.render("sitemap.xml", &context) {
            Ok(xml) => {
                let out = self.paths.output_dir().join("sitemap.xml");
                match render::write_output(&out, &xml) {
                    Ok(()) => println!("Generated: {}", out.display()),
                    Err(e) => eprintln!("Error writing sitemap: {e}"),
                }
            }
            Err(e) => eprintln!("Error rendering sitemap: {e}"),
        }
    }
}

/// Remove generated output and build state. Does not need a loadable
/// config, so a broken site can still be cleaned.
pub fn clean_site(paths: &SitePaths) -> Result<(), BuildError> {
    clean::clean_output(paths)?;
    SlugCache::invalidate(paths)?;

    // Content fingerprints go too; the image manifest is produced by an
    // external pipeline and stays.
    if let Ok(entries) = fs::read_dir(paths.cache_dir()) {
        for entry in entries.filter_map(Result::ok) {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("hash") {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
    Ok(())
}

fn markdown_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("md")
        })
        .collect();
    files.sort();
    files
}

/// The `posts` template variable: metadata of every `layout: post` page,
/// newest first, undated posts last.
fn posts_context(pages: &[CompiledPage]) -> Vec<Value> {
    let mut posts: Vec<_> = pages
        .iter()
        .filter(|p| p.meta.layout() == Some("post"))
        .map(|p| {
            let value = p.meta.as_value();
            (page::date_sort_key(&value), value)
        })
        .collect();
    posts.sort_by(|a, b| b.0.cmp(&a.0));
    posts.into_iter().map(|(_, value)| value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn scaffold() -> (TempDir, SitePaths) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "config.yaml", "title: Test Site\ntheme: dracula\n");
        write(root, "templates/default.html", "<main>{{ content }}</main>");
        write(root, "templates/post.html", "<article>{{ page.title }}</article>");
        write(
            root,
            "templates/blog.html",
            "{% for p in posts %}{{ p.title }};{% endfor %}",
        );
        write(
            root,
            "templates/tags.html",
            "{{ tag_name }}:{% for p in posts %}{{ p.title }},{% endfor %}",
        );
        write(
            root,
            "templates/sitemap.xml.j2",
            "{% for url in pages %}{{ url }} {% endfor %}",
        );
        let paths = SitePaths::new(root);
        (tmp, paths)
    }

    fn read(paths: &SitePaths, rel: &str) -> String {
        fs::read_to_string(paths.root().join(rel)).unwrap()
    }

    #[test]
    fn full_build_generates_pages_posts_tags_and_sitemap() {
        let (_tmp, paths) = scaffold();
        write(
            paths.root(),
            "content/index.md",
            "---\nlayout: default\n---\n# Home",
        );
        write(
            paths.root(),
            "content/blog.md",
            "---\nlayout: blog\n---\n",
        );
        write(
            paths.root(),
            "content/posts/first.md",
            "---\ntitle: First\nlayout: post\ndate: 2024-01-01\ntags: [rust]\n---\nbody",
        );
        write(
            paths.root(),
            "content/posts/second.md",
            "---\ntitle: Second\nlayout: post\ndate: 2024-02-01\ntags: [rust, site]\n---\nbody",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_site().unwrap();

        assert!(read(&paths, "index.html").contains("Home"));
        assert_eq!(read(&paths, "posts/first/index.html"), "<article>First</article>");
        // Listing is newest first
        assert_eq!(read(&paths, "blog/index.html"), "Second;First;");
        // Tag pages are flat files, listings newest first
        assert_eq!(read(&paths, "tags/rust.html"), "rust:Second,First,");
        assert_eq!(read(&paths, "tags/site.html"), "site:Second,");
        assert!(read(&paths, "sitemap.xml").contains("/posts/first"));
        // Theme CSS regenerated on load
        assert!(paths.theme_css().exists());
    }

    #[test]
    fn repeated_builds_are_idempotent() {
        let (_tmp, paths) = scaffold();
        write(
            paths.root(),
            "content/index.md",
            "---\nlayout: default\n---\n# Home",
        );
        write(
            paths.root(),
            "content/posts/p.md",
            "---\ntitle: P\nlayout: post\ndate: 2024-01-01\n---\nbody",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_site().unwrap();
        let first_index = read(&paths, "index.html");
        let first_post = read(&paths, "posts/p/index.html");
        let first_slugs = read(&paths, ".cache/page-slugs.json");

        site.build_site().unwrap();
        assert_eq!(read(&paths, "index.html"), first_index);
        assert_eq!(read(&paths, "posts/p/index.html"), first_post);
        assert_eq!(read(&paths, ".cache/page-slugs.json"), first_slugs);
    }

    #[test]
    fn drafts_are_skipped() {
        let (_tmp, paths) = scaffold();
        write(
            paths.root(),
            "content/wip.md",
            "---\ndraft: true\n---\nnot yet",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_site().unwrap();

        assert!(!paths.root().join("wip").exists());
        assert_eq!(SlugCache::load(&paths).len(), 0);
    }

    #[test]
    fn stale_page_pruned_on_next_build() {
        let (_tmp, paths) = scaffold();
        write(
            paths.root(),
            "content/old.md",
            "---\nlayout: default\n---\nold page",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_site().unwrap();
        assert!(paths.root().join("old/index.html").exists());

        fs::remove_file(paths.root().join("content/old.md")).unwrap();
        site.build_site().unwrap();
        assert!(!paths.root().join("old").exists());
    }

    #[test]
    fn deleted_posts_are_not_pruned() {
        let (_tmp, paths) = scaffold();
        write(
            paths.root(),
            "content/posts/keep.md",
            "---\ntitle: K\nlayout: post\n---\nx",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_site().unwrap();
        assert!(paths.root().join("posts/keep/index.html").exists());

        fs::remove_file(paths.root().join("content/posts/keep.md")).unwrap();
        site.build_site().unwrap();
        // Output pruning sweeps posts/ as a generated root, but the slug
        // diff itself never targets post slugs.
        assert!(SlugCache::load(&paths).is_empty());
    }

    #[test]
    fn broken_document_does_not_abort_build() {
        let (_tmp, paths) = scaffold();
        write(
            paths.root(),
            "content/good.md",
            "---\nlayout: default\n---\nfine",
        );
        write(
            paths.root(),
            "content/odd.md",
            "---\ntitle: [unclosed\n---\nbody",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_site().unwrap();
        assert!(paths.root().join("good/index.html").exists());
        // Malformed front-matter degrades to empty metadata, so the
        // document has no layout and is reported and skipped
        assert!(!paths.root().join("odd").exists());
    }

    #[test]
    fn document_without_layout_is_skipped() {
        let (_tmp, paths) = scaffold();
        write(paths.root(), "content/bare.md", "no front-matter at all");
        write(
            paths.root(),
            "content/kept.md",
            "---\nlayout: default\n---\nx",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_site().unwrap();

        // No implicit default layout: the page produces no artifact
        assert!(!paths.root().join("bare").exists());
        assert!(paths.root().join("kept/index.html").exists());
    }

    #[test]
    fn build_single_renders_one_document() {
        let (_tmp, paths) = scaffold();
        write(
            paths.root(),
            "content/solo.md",
            "---\nlayout: default\n---\nsolo page",
        );
        write(
            paths.root(),
            "content/other.md",
            "---\nlayout: default\n---\nother page",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_single(&paths.content_dir().join("solo.md"))
            .unwrap();

        assert!(paths.root().join("solo/index.html").exists());
        assert!(!paths.root().join("other").exists());
    }

    #[test]
    fn build_single_deleted_file_prunes_output_and_cache() {
        let (_tmp, paths) = scaffold();
        write(
            paths.root(),
            "content/gone.md",
            "---\nlayout: default\n---\nsoon gone",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_site().unwrap();
        assert!(paths.root().join("gone/index.html").exists());

        fs::remove_file(paths.root().join("content/gone.md")).unwrap();
        site.build_single(&paths.content_dir().join("gone.md"))
            .unwrap();

        assert!(!paths.root().join("gone").exists());
        assert!(!paths.slug_cache().exists());
    }

    #[test]
    fn clean_site_removes_output_and_state() {
        let (_tmp, paths) = scaffold();
        write(
            paths.root(),
            "content/index.md",
            "---\nlayout: default\n---\nhome",
        );
        write(
            paths.root(),
            "content/about.md",
            "---\nlayout: default\n---\nabout",
        );

        let site = Site::load(paths.root()).unwrap();
        site.build_site().unwrap();
        assert!(paths.root().join("index.html").exists());

        clean_site(&paths).unwrap();
        assert!(!paths.root().join("index.html").exists());
        assert!(!paths.root().join("about").exists());
        assert!(!paths.slug_cache().exists());
        // Sources untouched
        assert!(paths.root().join("content/about.md").exists());
    }

    #[test]
    fn missing_config_fails_load() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Site::load(tmp.path()),
            Err(BuildError::Config(_))
        ));
    }

    #[test]
    fn posts_context_sorted_newest_first_undated_last() {
        let pages = vec![
            page_with(serde_json::json!({"layout": "post", "title": "old", "date": "2023-01-01"})),
            page_with(serde_json::json!({"layout": "post", "title": "undated"})),
            page_with(serde_json::json!({"layout": "post", "title": "new", "date": "2024-01-01"})),
            page_with(serde_json::json!({"layout": "page", "title": "not a post"})),
        ];
        let posts = posts_context(&pages);
        let titles: Vec<_> = posts.iter().map(|p| p["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["new", "old", "undated"]);
    }

    fn page_with(meta: Value) -> CompiledPage {
        let data = match meta {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        CompiledPage {
            meta: crate::page::PageMeta::new(data),
            html: String::new(),
            stem: String::new(),
        }
    }
}
