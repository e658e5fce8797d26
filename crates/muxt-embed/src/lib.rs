//! The `embed_files!` macro.
//!
//! ```ignore
//! static ASSETS: muxt_templates::Files =
//!     muxt_templates::embed_files!("templates/*.html", "extra");
//! ```
//!
//! Each argument is a pattern: a string literal, a raw string literal, or a
//! bare path (`templates/partials`), separated by commas. Patterns are
//! resolved against the crate's manifest directory at expansion time. A
//! pattern with no glob metacharacters that names a directory selects every
//! file beneath it. The macro expands to a
//! `muxt_templates::Files::from_static` table of `(relative path,
//! include_str!(..))` entries, sorted by path.
//!
//! The muxt analyzer reads these same pattern tokens out of the analyzed
//! source to learn which files a `parse_files` call can see, so the
//! tokenization rules here and in the analyzer must agree.

use std::path::{Path, PathBuf};

use proc_macro::TokenStream;
use proc_macro2::TokenTree;
use quote::quote;

#[proc_macro]
pub fn embed_files(input: TokenStream) -> TokenStream {
    let input = proc_macro2::TokenStream::from(input);
    let patterns = match tokenize_patterns(input) {
        Ok(patterns) => patterns,
        Err(msg) => return compile_error(&msg),
    };
    if patterns.is_empty() {
        return compile_error("embed_files! needs at least one pattern");
    }

    let manifest_dir = match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return compile_error("CARGO_MANIFEST_DIR is not set"),
    };

    let mut entries: Vec<(String, PathBuf)> = Vec::new();
    for pattern in &patterns {
        match resolve_pattern(&manifest_dir, pattern) {
            Ok(matched) if matched.is_empty() => {
                return compile_error(&format!("pattern matches no files: {pattern:?}"));
            }
            Ok(matched) => {
                for (rel, abs) in matched {
                    if !entries.iter().any(|(existing, _)| *existing == rel) {
                        entries.push((rel, abs));
                    }
                }
            }
            Err(msg) => return compile_error(&msg),
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let pairs = entries.iter().map(|(rel, abs)| {
        let abs = abs.to_string_lossy().into_owned();
        quote! { (#rel, include_str!(#abs)) }
    });
    quote! {
        ::muxt_templates::Files::from_static(&[#(#pairs),*])
    }
    .into()
}

fn compile_error(msg: &str) -> TokenStream {
    quote! { compile_error!(#msg) }.into()
}

/// Split the macro arguments into pattern strings.
///
/// String and raw-string literals stand alone; every other run of tokens up
/// to a comma is joined into one bare pattern.
fn tokenize_patterns(input: proc_macro2::TokenStream) -> Result<Vec<String>, String> {
    let mut patterns = Vec::new();
    let mut bare = String::new();
    let mut flush = |bare: &mut String, patterns: &mut Vec<String>| {
        if !bare.is_empty() {
            patterns.push(std::mem::take(bare));
        }
    };
    for token in input {
        match token {
            TokenTree::Punct(p) if p.as_char() == ',' => flush(&mut bare, &mut patterns),
            TokenTree::Literal(lit) => {
                let text = lit.to_string();
                if let Some(unquoted) = unquote_string(&text) {
                    flush(&mut bare, &mut patterns);
                    patterns.push(unquoted?);
                } else {
                    bare.push_str(&text);
                }
            }
            TokenTree::Ident(ident) => bare.push_str(&ident.to_string()),
            TokenTree::Punct(p) => bare.push(p.as_char()),
            TokenTree::Group(_) => return Err("unexpected group in embed pattern".into()),
        }
    }
    flush(&mut bare, &mut patterns);
    Ok(patterns)
}

/// Unquote `"…"`, `r"…"`, and `r#"…"#` literal spellings. Returns `None`
/// for non-string literals (a number inside a bare pattern, say).
fn unquote_string(text: &str) -> Option<Result<String, String>> {
    if let Some(raw) = text.strip_prefix('r') {
        let hashes = raw.bytes().take_while(|&b| b == b'#').count();
        let body = raw[hashes..]
            .strip_prefix('"')?
            .strip_suffix(&"#".repeat(hashes))?
            .strip_suffix('"')?;
        return Some(Ok(body.to_string()));
    }
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            other => {
                return Some(Err(format!(
                    "unsupported escape in embed pattern: \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Some(Ok(out))
}

/// Expand one pattern to `(relative, absolute)` file paths. Hidden files
/// and directories are never selected.
fn resolve_pattern(root: &Path, pattern: &str) -> Result<Vec<(String, PathBuf)>, String> {
    if pattern.starts_with('/') || pattern.contains("..") {
        return Err(format!("embed pattern must stay inside the crate: {pattern:?}"));
    }

    // A plain directory name selects its whole subtree.
    let has_meta = pattern.contains(['*', '?', '[']);
    let effective = if !has_meta && root.join(pattern).is_dir() {
        format!("{}/**/*", pattern.trim_end_matches('/'))
    } else {
        pattern.to_string()
    };

    let full = root.join(&effective);
    let full_pattern = full.to_string_lossy().into_owned();
    let walker = glob::glob(&full_pattern).map_err(|e| format!("malformed pattern: {e}"))?;

    let mut out = Vec::new();
    for entry in walker {
        let path = entry.map_err(|e| format!("unreadable path: {e}"))?;
        if !path.is_file() {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .map_err(|_| format!("matched file escapes the crate: {}", path.display()))?;
        let rel = rel.to_string_lossy().replace('\\', "/");
        // Hidden files are never embedded implicitly.
        if rel.split('/').any(|seg| seg.starts_with('.')) {
            continue;
        }
        out.push((rel, path));
    }
    Ok(out)
}
