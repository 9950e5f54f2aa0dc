//! # Pagesmith
//!
//! An incremental markdown site builder. Content lives in `content/` as
//! markdown with YAML front-matter, templates in `templates/`, and the
//! generated pages land in the site root itself as `<url>/index.html`
//! directories — ready to serve from the same checkout.
//!
//! # Architecture: One Pass, Persistent State
//!
//! A build is a single synchronous pass over the content tree, with two
//! small state files under `.cache/` carrying knowledge between runs:
//!
//! ```text
//! config.yaml + content/*.md ──compile──▶ pages ──render──▶ <root>/<url>/index.html
//!                                  │                 ▲
//!            .cache/page-slugs.json┘                 │.cache/image-manifest.json
//!            (prune vanished pages)                  (responsive <picture> rewrite)
//! ```
//!
//! Because output shares a directory with sources, every full build starts
//! by sweeping its own previous output ([`clean`]) and finishes by
//! reconciling the persisted slug set ([`cache`]) so pages deleted from
//! `content/` disappear from the site too.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `config.yaml` loading and the site directory layout |
//! | [`theme`] | theme normalization and generated daisyUI CSS |
//! | [`page`] | front-matter parsing, URL derivation, date/draft coercion |
//! | [`markdown`] | markdown → HTML conversion |
//! | [`render`] | template loading, layout resolution, page output |
//! | [`rewrite`] | `<img>` → `<picture>` responsive-image rewriting |
//! | [`cache`] | slug set and content fingerprints under `.cache/` |
//! | [`clean`] | sweeping generated output out of the site root |
//! | [`site`] | build orchestration: full builds and single-file builds |
//!
//! # Design Decisions
//!
//! ## Output Into the Site Root
//!
//! There is no `dist/`. Pages are generated next to their sources, which
//! makes the checkout itself deployable but obliges the builder to know
//! exactly which files are its own: [`clean`] works from fixed lists of
//! preserved source roots and generated shapes rather than a wipe.
//!
//! ## Degrade, Don't Abort
//!
//! One broken document should never take the site down. Malformed
//! front-matter renders as plain body text, a failed render logs and moves
//! on, and corrupt cache files are treated as absent. Only the truly
//! unrecoverable — no `config.yaml` — stops a build.
//!
//! ## Externally Produced Image Manifest
//!
//! The builder rewrites `<img>` tags against `.cache/image-manifest.json`
//! but never encodes images itself. Encoding is slow, cacheable work that
//! belongs in a separate pipeline; the manifest is the contract between
//! the two, and a missing manifest simply disables the rewrite.

pub mod cache;
pub mod clean;
pub mod config;
pub mod markdown;
pub mod page;
pub mod render;
pub mod rewrite;
pub mod site;
pub mod theme;
