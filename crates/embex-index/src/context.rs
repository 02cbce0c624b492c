//! Contextualized embedding text generation.
//!
//! The file path, language and unit name are prepended to a chunk's text
//! before it is embedded.

use crate::chunker::Chunk;

/// Generate text optimized for embedding (not for display).
#[must_use]
pub fn contextualize_for_embedding(chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.text.len() + 128);

    text.push_str("# ");
    text.push_str(&chunk.path);
    text.push('\n');

    if let Some(lang) = chunk.language {
        text.push_str("# Language: ");
        text.push_str(lang.id());
        text.push('\n');
    }

    if let Some(name) = &chunk.name {
        text.push_str("# ");
        text.push_str(&chunk.kind);
        text.push_str(": ");
        text.push_str(name);
        text.push('\n');
    }

    text.push_str(&chunk.text);
    text
}

/// Short header for display in retrieved results.
#[must_use]
pub fn chunk_display_header(path: &str, name: Option<&str>, kind: &str, lines: (usize, usize)) -> String {
    format!(
        "{path} :: {} (lines {}-{})",
        name.unwrap_or(kind),
        lines.0,
        lines.1
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::Lang;

    fn sample_chunk() -> Chunk {
        Chunk {
            path: "src/auth.py".into(),
            ordinal: 0,
            start_line: 1,
            end_line: 3,
            start_byte: 0,
            end_byte: 30,
            kind: "function".into(),
            name: Some("login".into()),
            language: Some(Lang::Python),
            text: "def login():\n    pass\n".into(),
        }
    }

    #[test]
    fn contextualize_includes_path_language_and_name() {
        let text = contextualize_for_embedding(&sample_chunk());
        assert!(text.starts_with("# src/auth.py\n"));
        assert!(text.contains("# Language: python\n"));
        assert!(text.contains("# function: login\n"));
        assert!(text.ends_with("def login():\n    pass\n"));
    }

    #[test]
    fn contextualize_omits_missing_parts() {
        let mut chunk = sample_chunk();
        chunk.language = None;
        chunk.name = None;
        let text = contextualize_for_embedding(&chunk);
        assert!(!text.contains("Language:"));
        assert!(!text.contains("function:"));
    }

    #[test]
    fn display_header_with_name() {
        assert_eq!(
            chunk_display_header("src/lib.rs", Some("hello"), "function", (1, 3)),
            "src/lib.rs :: hello (lines 1-3)"
        );
    }

    #[test]
    fn display_header_falls_back_to_kind() {
        assert_eq!(
            chunk_display_header("src/lib.rs", None, "window", (4, 9)),
            "src/lib.rs :: window (lines 4-9)"
        );
    }
}
