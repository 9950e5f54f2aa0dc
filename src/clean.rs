//! Removal of generated output from the site root.
//!
//! Output lands in the site root itself, right next to sources, so cleanup
//! cannot just wipe a build directory. Instead it walks the root with two
//! allow/deny lists: top-level source and tool directories are never
//! entered, while known generated roots (`blog/`, `tags/`, `posts/`) and
//! the generated file shapes (`index.html`, `*.xml`) are deleted wherever
//! they appear. Directories emptied by the sweep are removed as well.

use crate::config::SitePaths;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Top-level directories that are sources or tool state, never output.
const PRESERVED_ROOTS: [&str; 8] = [
    ".git",
    ".github",
    ".cache",
    "assets",
    "content",
    "node_modules",
    "src",
    "templates",
];

/// Top-level directories that contain only generated output.
const GENERATED_ROOTS: [&str; 3] = ["blog", "tags", "posts"];

/// Delete generated output under the site root. Returns the number of
/// files removed.
pub fn clean_output(paths: &SitePaths) -> io::Result<usize> {
    let root = paths.output_dir();
    let mut deleted = 0usize;

    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let Some(top) = rel
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
        else {
            continue;
        };
        if PRESERVED_ROOTS.contains(&top.as_str()) {
            continue;
        }

        if entry.file_type().is_file() {
            if GENERATED_ROOTS.contains(&top.as_str()) || is_generated_file(path) {
                fs::remove_file(path)?;
                deleted += 1;
            }
        } else if entry.file_type().is_dir() && fs::read_dir(path)?.next().is_none() {
            // Contents were visited first, so this catches directories the
            // sweep just emptied.
            fs::remove_dir(path)?;
        }
    }

    if deleted == 0 {
        println!("No generated files found to delete.");
    } else {
        println!("Deleted {deleted} generated file(s).");
    }
    Ok(deleted)
}

fn is_generated_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some("index.html") => true,
        Some(name) => name.ends_with(".xml"),
        None => false,
    }
}
