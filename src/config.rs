//! Site configuration and well-known paths.
//!
//! Configuration lives in a single `config.yaml` at the site root. Unlike
//! most of the build state, the config file is required: a site without one
//! fails fast instead of rendering with guessed values. The document is
//! deliberately open-ended — beyond the `theme` key (normalized at load
//! time, see [`crate::theme`]) every field is passed through to templates
//! verbatim under the `site` context variable, so adding an `author:` or
//! `base_url:` key needs no code change here.
//!
//! [`SitePaths`] centralizes the directory layout a site is expected to
//! have:
//!
//! ```text
//! site/
//! ├── config.yaml                      # Site configuration (required)
//! ├── content/                         # Top-level pages (*.md, non-recursive)
//! │   ├── index.md
//! │   └── posts/                       # Post documents
//! │       └── hello-world.md
//! ├── templates/                       # Jinja-style templates
//! ├── assets/                          # Static assets (preserved on clean)
//! └── .cache/                          # Build state (slug set, fingerprints,
//!                                      #   image manifest) — safe to delete
//! ```
//!
//! Generated output is written into the site root itself: per-page
//! `index.html` directories, `tags/`, and `sitemap.xml`.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config file {0} must contain a mapping")]
    NotAMapping(PathBuf),
}

/// Well-known locations derived from the site root.
#[derive(Debug, Clone)]
pub struct SitePaths {
    root: PathBuf,
}

impl SitePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join("content")
    }

    pub fn posts_dir(&self) -> PathBuf {
        self.root.join("content").join("posts")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".cache")
    }

    pub fn slug_cache(&self) -> PathBuf {
        self.cache_dir().join("page-slugs.json")
    }

    pub fn image_manifest(&self) -> PathBuf {
        self.cache_dir().join("image-manifest.json")
    }

    pub fn theme_css(&self) -> PathBuf {
        self.root
            .join("assets")
            .join("css")
            .join("generated.daisyui.css")
    }

    /// Output directory — pages are generated into the site root itself.
    pub fn output_dir(&self) -> &Path {
        &self.root
    }
}

/// Site-wide configuration, loaded once per invocation and read-only after.
///
/// Internally a JSON-value map so arbitrary user fields survive the trip to
/// the template context. The `theme` key is normalized in place during
/// [`SiteConfig::load`].
#[derive(Debug, Clone)]
pub struct SiteConfig {
    data: Map<String, Value>,
}

impl SiteConfig {
    pub fn load(paths: &SitePaths) -> Result<Self, ConfigError> {
        let path = paths.config_file();
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let yaml: serde_yaml::Value = serde_yaml::from_str(&raw)?;
        let data = match yaml_to_json(yaml) {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(ConfigError::NotAMapping(path)),
        };
        Ok(Self::from_map(data))
    }

    /// Build a config from an already-parsed mapping, normalizing the theme.
    pub fn from_map(mut data: Map<String, Value>) -> Self {
        crate::theme::normalize(&mut data);
        Self { data }
    }

    /// The normalized theme mapping (always present after load).
    pub fn theme(&self) -> &Value {
        self.data.get("theme").unwrap_or(&Value::Null)
    }

    /// Full config as a JSON value, for the `site` template variable.
    pub fn as_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

/// Convert a YAML document into the JSON value model used everywhere else.
///
/// Non-string mapping keys are stringified; tagged values collapse to their
/// payload; non-finite floats become null (JSON has no representation).
pub(crate) fn yaml_to_json(yaml: serde_yaml::Value) -> Value {
    match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            Value::Array(seq.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    other => serde_yaml::to_string(&other)
                        .map(|s| s.trim_end().to_string())
                        .unwrap_or_default(),
                };
                out.insert(key, yaml_to_json(value));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}
