//! Project-specific utilities live here.

/// Longest stem a stored file may get. Leaves room for a `-xxxxxxxx`
/// disambiguation suffix and an extension within the 128-character `image`
/// column.
pub const MAX_FILE_STEM_LEN: usize = 110;

/// Turn untrusted text into a single safe path component.
///
/// Only ASCII letters, digits, `-` and `_` survive; everything else (path
/// separators, dots, whitespace, non-ASCII) becomes `_`, runs of `_` collapse,
/// and leading/trailing `_`/`-` are trimmed. Returns `None` when nothing usable
/// is left.
pub fn sanitize_file_stem(raw: &str) -> Option<String> {
    let mut stem = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            ch
        } else {
            '_'
        };
        if mapped == '_' && stem.ends_with('_') {
            continue;
        }
        stem.push(mapped);
    }

    let trimmed: String = stem
        .trim_matches(|c| c == '_' || c == '-')
        .chars()
        .take(MAX_FILE_STEM_LEN)
        .collect();
    let trimmed = trimmed.trim_end_matches(|c| c == '_' || c == '-');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Extension of a declared filename: the text after the last `.`.
pub fn file_extension(file_name: &str) -> Option<&str> {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}
