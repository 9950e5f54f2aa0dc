//! Responsive-image rewriting over a streaming token view of the HTML.
//!
//! Rendered pages reference source images directly
//! (`<img src="/assets/images/cat.jpg">`); an external pipeline pre-encodes
//! each image into multiple formats and widths and records them in
//! `.cache/image-manifest.json`. This module swaps those `<img>` tags for
//! format-negotiated `<picture>` fragments:
//!
//! ```text
//! <picture>
//!   <source type="image/avif" srcset="/img/cat-400.avif 400w, ..." sizes="100vw">
//!   <source type="image/webp" srcset="..." sizes="100vw">
//!   <source type="image/jpeg" srcset="..." sizes="100vw">
//!   <img src="/img/cat-800.jpg" alt="..." srcset="..." sizes="100vw">
//! </picture>
//! ```
//!
//! (shown indented for readability — the emitted fragment has no inserted
//! whitespace).
//!
//! There is no DOM: the document streams through a quick-xml reader/writer
//! pair with a pass-through default arm, so every token we do not touch —
//! end tags, text, comments, doctype, entity references — is reproduced
//! verbatim from its original byte slice. The one special case is a start
//! (or empty) tag named `img` whose `src` resolves into the manifest; on
//! any miss the original tag passes through byte-identical.

use crate::config::SitePaths;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Cursor;

/// One pre-encoded rendition of a source image.
#[derive(Debug, Clone, Deserialize)]
pub struct Variant {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub width: u32,
}

/// Manifest: image base filename → format → width-sorted variants.
pub type ImageManifest = HashMap<String, HashMap<String, Vec<Variant>>>;

/// `<source>` emission order — best compression first, the browser picks
/// the first type it supports.
const SOURCE_FORMATS: [&str; 5] = ["avif", "webp", "jpg", "jpeg", "png"];

/// Fallback `<img>` preference — universally decodable formats first.
const FALLBACK_FORMATS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "avif"];

/// Path segment that marks an image as manifest-managed.
const IMAGES_SEGMENT: &str = "assets/images/";

/// Load the image manifest, degrading to empty on absence or bad JSON.
pub fn load_manifest(paths: &SitePaths) -> ImageManifest {
    let path = paths.image_manifest();
    let Ok(raw) = fs::read_to_string(&path) else {
        return ImageManifest::new();
    };
    match serde_json::from_str(&raw) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!(
                "Warning: unable to parse image manifest {}: {e}",
                path.display()
            );
            ImageManifest::new()
        }
    }
}

/// Rewrite manifest-managed `<img>` tags into `<picture>` fragments.
///
/// No-op when the document or the manifest is empty. A document the
/// tokenizer cannot get through is returned unchanged with a warning —
/// an unrewritten image is a degraded page, a half-rewritten one is a
/// broken page.
pub fn rewrite_images(html: &str, manifest: &ImageManifest) -> String {
    if html.is_empty() || manifest.is_empty() {
        return html.to_string();
    }
    match rewrite(html, manifest) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Warning: image rewrite left document unchanged: {e}");
            html.to_string()
        }
    }
}

fn rewrite(html: &str, manifest: &ImageManifest) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_reader(html.as_bytes());
    reader.config_mut().trim_text(false);
    reader.config_mut().enable_all_checks(false);

    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(html.len())));

    loop {
        match reader.read_event()? {
            Event::Start(elem) if is_img(&elem) => match picture_for(&elem, manifest) {
                Some(fragment) => {
                    writer.write_event(Event::Text(BytesText::from_escaped(fragment)))?
                }
                None => writer.write_event(Event::Start(elem))?,
            },
            Event::Empty(elem) if is_img(&elem) => match picture_for(&elem, manifest) {
                Some(fragment) => {
                    writer.write_event(Event::Text(BytesText::from_escaped(fragment)))?
                }
                None => writer.write_event(Event::Empty(elem))?,
            },
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_img(elem: &BytesStart<'_>) -> bool {
    elem.name().as_ref().eq_ignore_ascii_case(b"img")
}

/// Build the replacement fragment for an `img` tag, or `None` to pass the
/// original through: no `src`, not under `assets/images/`, no manifest
/// entry, or no usable variants.
fn picture_for(elem: &BytesStart<'_>, manifest: &ImageManifest) -> Option<String> {
    let attrs = collect_attrs(elem);
    let src = attr_value(&attrs, "src")?;
    let entry = manifest.get(manifest_key(src)?)?;
    build_picture(&attrs, entry)
}

fn collect_attrs(elem: &BytesStart<'_>) -> Vec<(String, String)> {
    elem.html_attributes()
        .filter_map(Result::ok)
        .map(|attr| {
            let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(Cow::into_owned)
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (name, value)
        })
        .collect()
}

fn attr_value<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Normalize a `src` into a manifest key: strip query/fragment and leading
/// `/` or `./`, require the `assets/images/` segment, take the base name.
fn manifest_key(src: &str) -> Option<&str> {
    let end = src.find(['?', '#']).unwrap_or(src.len());
    let path = &src[..end];
    let path = path.trim_start_matches('/');
    let path = path.strip_prefix("./").unwrap_or(path);
    let (_, rel) = path.split_once(IMAGES_SEGMENT)?;
    rel.rsplit('/').next()
}

/// Variants of one format that are actually emittable: non-empty path and
/// positive width, sorted ascending by width. A format with none is
/// treated as absent from the manifest.
fn usable_variants<'a>(entry: &'a HashMap<String, Vec<Variant>>, fmt: &str) -> Vec<&'a Variant> {
    let mut variants: Vec<&Variant> = entry
        .get(fmt)
        .map(|vs| {
            vs.iter()
                .filter(|v| !v.path.is_empty() && v.width > 0)
                .collect()
        })
        .unwrap_or_default();
    variants.sort_by_key(|v| v.width);
    variants
}

fn srcset(variants: &[&Variant]) -> String {
    variants
        .iter()
        .map(|v| format!("/{} {}w", v.path, v.width))
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_picture(
    attrs: &[(String, String)],
    entry: &HashMap<String, Vec<Variant>>,
) -> Option<String> {
    let sizes = attr_value(attrs, "data-img-sizes")
        .or_else(|| attr_value(attrs, "sizes"))
        .unwrap_or("100vw");

    let mut sources = String::new();
    for fmt in SOURCE_FORMATS {
        let variants = usable_variants(entry, fmt);
        if variants.is_empty() {
            continue;
        }
        let mime = match fmt {
            "jpg" | "jpeg" => Cow::Borrowed("image/jpeg"),
            _ => Cow::Owned(format!("image/{fmt}")),
        };
        let _ = write!(
            sources,
            r#"<source type="{}" srcset="{}" sizes="{}">"#,
            mime,
            escape(srcset(&variants).as_str()),
            escape(sizes),
        );
    }
    if sources.is_empty() {
        return None;
    }

    let fallback = FALLBACK_FORMATS
        .iter()
        .map(|fmt| usable_variants(entry, fmt))
        .find(|variants| !variants.is_empty())?;
    let largest = fallback.last()?;

    let mut img = String::from("<img");
    push_attr(&mut img, "src", &format!("/{}", largest.path));
    for (name, value) in attrs {
        if matches!(
            name.to_ascii_lowercase().as_str(),
            "src" | "srcset" | "sizes" | "data-img-sizes"
        ) {
            continue;
        }
        push_attr(&mut img, name, value);
    }
    push_attr(&mut img, "srcset", &srcset(&fallback));
    push_attr(&mut img, "sizes", sizes);
    img.push('>');

    Some(format!("<picture>{sources}{img}</picture>"))
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, r#" {}="{}""#, name, escape(value));
}
