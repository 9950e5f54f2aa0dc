use clap::Parser;
use pagesmith::config::SitePaths;
use pagesmith::site::{self, Site};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagesmith")]
#[command(about = "Incremental markdown site builder")]
#[command(version)]
#[command(long_about = "\
Incremental markdown site builder

Builds a site in place: generated pages land in the site root itself,
next to their sources.

Site structure:

  site/
  ├── config.yaml                  # Site config (required; `theme` is normalized)
  ├── content/                     # Top-level pages (*.md, non-recursive)
  │   ├── index.md                 # → /index.html
  │   ├── about.md                 # → /about/index.html
  │   └── posts/                   # Posts → /posts/<slug>/index.html
  │       └── hello.md
  ├── templates/                   # Jinja-style templates (layout: <name>)
  ├── assets/                      # Static assets (preserved on clean)
  └── .cache/                      # Slug set, content fingerprints, and the
                                   #   externally produced image manifest

With no flags the whole site is rebuilt. --file rebuilds one document
(or prunes its output if the file was deleted) — the fast path for
editor save hooks.")]
struct Cli {
    /// Site root directory
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Build a single content file instead of the whole site
    #[arg(long)]
    file: Option<PathBuf>,

    /// Delete generated output and build state, then exit
    #[arg(long)]
    clean: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.clean {
        // Cleaning must work even when config.yaml is broken or missing.
        site::clean_site(&SitePaths::new(&cli.root))?;
        return Ok(());
    }

    let site = Site::load(&cli.root)?;
    match cli.file {
        Some(file) => {
            let file = if file.is_absolute() {
                file
            } else {
                cli.root.join(file)
            };
            site.build_single(&file)?;
        }
        None => site.build_site()?,
    }

    Ok(())
}
