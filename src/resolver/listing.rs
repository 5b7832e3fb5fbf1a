//! HTML index pages for manifest directories.

use std::io;
use std::path::Path;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::resolver::path::is_hidden;

/// Characters escaped inside a single href path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq, Eq)]
struct ListingEntry {
    name: String,
    is_dir: bool,
    len: u64,
}

/// Render the index page for `dir`, a directory under the canonical `root`.
///
/// `base` is the URL path of the directory with a trailing slash; `at_root`
/// suppresses the parent link at the top of the route. Entries whose
/// canonical path leaves `root` are omitted.
pub async fn render_listing(
    dir: &Path,
    root: &Path,
    base: &str,
    at_root: bool,
) -> io::Result<String> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_hidden(&name) {
            continue;
        }
        // Dangling symlinks fail to canonicalize and are skipped.
        let Ok(target) = tokio::fs::canonicalize(entry.path()).await else {
            continue;
        };
        if !target.starts_with(root) {
            continue;
        }
        let Ok(metadata) = tokio::fs::metadata(&target).await else {
            continue;
        };
        entries.push(ListingEntry {
            name,
            is_dir: metadata.is_dir(),
            len: if metadata.is_dir() { 0 } else { metadata.len() },
        });
    }

    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));

    Ok(render_page(base, at_root, &entries))
}

fn render_page(base: &str, at_root: bool, entries: &[ListingEntry]) -> String {
    let title = escape_html(base);
    let mut out = String::with_capacity(256 + entries.len() * 96);
    out.push_str("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Index of ");
    out.push_str(&title);
    out.push_str("</title></head>\n<body>\n<h1>Index of ");
    out.push_str(&title);
    out.push_str("</h1><hr><pre>\n");

    if !at_root {
        out.push_str("<a href=\"../\">../</a>\n");
    }

    for entry in entries {
        let href = escape_html(&utf8_percent_encode(&entry.name, SEGMENT).to_string());
        let label = escape_html(&entry.name);
        if entry.is_dir {
            out.push_str(&format!("<a href=\"{href}/\">{label}/</a>\n"));
        } else {
            out.push_str(&format!("<a href=\"{href}\">{label}</a> {}\n", entry.len));
        }
    }

    out.push_str("</pre><hr></body>\n</html>\n");
    out
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
