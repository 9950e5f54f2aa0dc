//! Theme normalization and generated CSS.
//!
//! The `theme` config key accepts three shapes:
//!
//! ```yaml
//! theme: dracula                  # shorthand — just a preset name
//!
//! theme:                          # mapping with preset selection
//!   default: nord
//!   include: [nord, dracula]
//!
//! theme:                          # mapping with custom theme definitions
//!   default: mytheme
//!   custom:
//!     mytheme:
//!       color-scheme: dark
//!       --color-primary: "#7aa2f7"
//! ```
//!
//! [`normalize`] rewrites whatever was given into the canonical mapping
//! `{default, include[], ...}` so templates and the CSS generator see one
//! shape. [`write_theme_file`] emits the daisyUI `@plugin` blocks consumed
//! by the site's Tailwind build.

use serde_json::{Map, Value, json};
use std::fs;
use std::io;
use std::path::Path;

const FALLBACK_THEME: &str = "dracula";

/// Normalize the `theme` key of a config mapping in place.
///
/// Shorthand strings become `{default: <s>}`. The default name is resolved
/// through the `default` → `preset` → `name` fallback chain; the include
/// list accepts `include` or `presets`, promotes a lone scalar to a list,
/// dedupes while preserving order, and always contains the default.
pub fn normalize(config: &mut Map<String, Value>) {
    let mut normalized = match config.get("theme") {
        Some(Value::String(s)) => {
            let mut map = Map::new();
            map.insert("default".into(), Value::String(s.clone()));
            map
        }
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    let default_theme = ["default", "preset", "name"]
        .into_iter()
        .find_map(|key| non_empty_str(normalized.get(key)))
        .unwrap_or_else(|| FALLBACK_THEME.to_string());
    normalized.insert("default".into(), Value::String(default_theme.clone()));

    let has_entries = |v: &&Value| match v {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        _ => true,
    };
    let candidates = normalized
        .get("include")
        .filter(has_entries)
        .or_else(|| normalized.get("presets").filter(has_entries));
    let candidates: Vec<Value> = match candidates {
        None => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    };

    let mut ordered = Vec::new();
    for entry in candidates {
        if let Some(name) = non_empty_str(Some(&entry))
            && !ordered.contains(&name)
        {
            ordered.push(name);
        }
    }
    if !ordered.contains(&default_theme) {
        ordered.insert(0, default_theme);
    }
    normalized.insert(
        "include".into(),
        Value::Array(ordered.into_iter().map(Value::String).collect()),
    );

    config.insert("theme".into(), Value::Object(normalized));
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Write the generated daisyUI CSS file for a normalized theme mapping.
///
/// One `@plugin "daisyui"` block selects the included presets (`themes: all`
/// when the include list is empty), followed by one `@plugin "daisyui/theme"`
/// block per custom theme definition.
pub fn write_theme_file(theme: &Value, output_path: &Path) -> io::Result<()> {
    let include: Vec<&str> = theme
        .get("include")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut names = Vec::new();
    for name in include {
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }

    let mut blocks = Vec::new();
    if names.is_empty() {
        blocks.push("@plugin \"daisyui\" {\n  themes: all;\n}".to_string());
    } else {
        let joined = names
            .iter()
            .map(|name| json!(name).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        blocks.push(format!(
            "@plugin \"daisyui\" {{\n  themes: ({joined});\n}}"
        ));
    }

    let default_theme = theme.get("default").and_then(Value::as_str);
    if let Some(Value::Object(custom)) = theme.get("custom") {
        for (name, values) in custom {
            let Value::Object(values) = values else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            blocks.push(custom_theme_block(name, values, default_theme));
        }
    }

    let css = blocks.join("\n\n") + "\n";
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, css)
}

/// Build one `@plugin "daisyui/theme"` block.
///
/// `name` and `default` lead the block (filled in from the map key and the
/// site default when not given explicitly); remaining keys follow.
fn custom_theme_block(
    name: &str,
    values: &Map<String, Value>,
    default_theme: Option<&str>,
) -> String {
    let mut pairs: Vec<(String, Value)> = Vec::new();

    let theme_name = values
        .get("name")
        .cloned()
        .unwrap_or_else(|| Value::String(name.to_string()));
    pairs.push(("name".into(), theme_name));

    let is_default = values
        .get("default")
        .cloned()
        .unwrap_or_else(|| Value::Bool(default_theme == Some(name)));
    pairs.push(("default".into(), is_default));

    for (key, value) in values {
        if key == "name" || key == "default" {
            continue;
        }
        pairs.push((key.clone(), value.clone()));
    }

    let mut lines = vec!["@plugin \"daisyui/theme\" {".to_string()];
    for (key, value) in &pairs {
        lines.push(format!("  {}: {};", key, format_value(value)));
    }
    lines.push("}".to_string());
    lines.join("\n")
}

/// Format a config value as a CSS declaration token.
///
/// Bare token when safe; JSON-quoted when the string contains whitespace,
/// `;`, `:` or quotes (anything that would break the declaration).
fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if s.is_empty() {
                "\"\"".to_string()
            } else if s
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, ';' | ':' | '"'))
            {
                json!(s).to_string()
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}
