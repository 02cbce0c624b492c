//! Static outline of one file: imports, top-level declarations and their docs.
//!
//! Built from the same boundary units the chunker uses, so no embedding or
//! generation call is involved.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::languages::detect_language;
use crate::structure::{BoundaryRegistry, line_count};

const DOC_CHARS: usize = 200;

const IMPORT_PREFIXES: &[&str] = &[
    "import ",
    "from ",
    "use ",
    "pub use ",
    "extern crate ",
    "#include ",
    "require(",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    /// Coarse unit kind: `class`, `function` or `declaration`.
    pub kind: &'static str,
    pub name: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    /// First code line of the declaration, trimmed.
    pub signature: String,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutline {
    pub path: String,
    pub language: Option<&'static str>,
    pub line_count: usize,
    pub module_doc: Option<String>,
    pub imports: Vec<String>,
    pub entries: Vec<OutlineEntry>,
}

impl FileOutline {
    /// Outline `content` as the file at project-relative `path`.
    #[must_use]
    pub fn build(path: &str, content: &str, registry: &BoundaryRegistry) -> Self {
        let lines: Vec<&str> = content.lines().collect();
        let units = registry
            .detector_for(Path::new(path))
            .units(content)
            .unwrap_or_default();

        let entries = units
            .into_iter()
            .filter(|u| u.kind != "module" && u.kind != "window")
            .filter_map(|u| {
                let name = u.name?;
                let body = lines.get(u.start..u.end.min(lines.len()))?;
                let sig_at = body.iter().position(|l| !is_trivia(l))?;
                let doc = leading_doc(&body[..sig_at]).or_else(|| docstring(&body[sig_at + 1..]));
                Some(OutlineEntry {
                    kind: u.kind,
                    name,
                    start_line: u.start + sig_at + 1,
                    end_line: u.end,
                    signature: body[sig_at].trim().to_owned(),
                    doc,
                })
            })
            .collect();

        let imports = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| IMPORT_PREFIXES.iter().any(|p| l.starts_with(p)))
            .map(str::to_owned)
            .collect();

        Self {
            path: path.to_owned(),
            language: detect_language(Path::new(path)).map(|l| l.id()),
            line_count: line_count(content),
            module_doc: module_doc(&lines),
            imports,
            entries,
        }
    }
}

impl fmt::Display for FileOutline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} lines", self.path, self.line_count)?;
        if let Some(lang) = self.language {
            write!(f, ", {lang}")?;
        }
        writeln!(f, ")")?;
        if let Some(doc) = &self.module_doc {
            writeln!(f, "  {doc}")?;
        }
        if !self.imports.is_empty() {
            writeln!(f, "imports ({}):", self.imports.len())?;
            for import in &self.imports {
                writeln!(f, "  {import}")?;
            }
        }
        for entry in &self.entries {
            writeln!(
                f,
                "{:>5}  {:<11} {}",
                entry.start_line, entry.kind, entry.signature
            )?;
            if let Some(doc) = &entry.doc {
                writeln!(f, "{:>19}{doc}", "")?;
            }
        }
        Ok(())
    }
}

fn is_trivia(line: &str) -> bool {
    let t = line.trim_start();
    t.is_empty()
        || t.starts_with("//")
        || t.starts_with("/*")
        || t.starts_with('*')
        || t.starts_with('#')
        || t.starts_with('@')
}

fn strip_comment(line: &str) -> &str {
    let t = line.trim();
    let t = t
        .trim_start_matches("///")
        .trim_start_matches("//!")
        .trim_start_matches("//")
        .trim_start_matches("/**")
        .trim_start_matches("/*")
        .trim_end_matches("*/")
        .trim_start_matches('*');
    t.strip_prefix("# ").unwrap_or(t).trim()
}

/// Comment lines directly above a declaration, skipping attributes and decorators.
fn leading_doc(lines: &[&str]) -> Option<String> {
    let text: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.starts_with("#[") && !l.starts_with('@'))
        .map(strip_comment)
        .filter(|l| !l.is_empty())
        .collect();
    join_doc(&text)
}

/// A triple-quoted string opening the body, as Python writes docs.
fn docstring(body: &[&str]) -> Option<String> {
    let first = body.iter().position(|l| !l.trim().is_empty())?;
    let opening = body[first].trim();
    let quote = ["\"\"\"", "'''"].into_iter().find(|q| opening.starts_with(q))?;

    let rest = &opening[quote.len()..];
    if let Some(end) = rest.find(quote) {
        return join_doc(&[rest[..end].trim()]);
    }
    let mut parts = vec![rest.trim()];
    for line in &body[first + 1..] {
        let line = line.trim();
        if let Some(end) = line.find(quote) {
            parts.push(line[..end].trim());
            break;
        }
        parts.push(line);
    }
    join_doc(&parts)
}

fn module_doc(lines: &[&str]) -> Option<String> {
    let inner: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .take_while(|l| l.starts_with("//!"))
        .map(strip_comment)
        .collect();
    join_doc(&inner).or_else(|| {
        let start = lines
            .iter()
            .position(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))?;
        docstring(&lines[start..])
    })
}

fn join_doc(parts: &[&str]) -> Option<String> {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        return None;
    }
    Some(match joined.char_indices().nth(DOC_CHARS) {
        Some((cut, _)) => format!("{}...", &joined[..cut]),
        None => joined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docstring_single_and_multi_line() {
        assert_eq!(
            docstring(&["    \"\"\"Open a session.\"\"\"", "    pass"]).as_deref(),
            Some("Open a session.")
        );
        assert_eq!(
            docstring(&["'''Spans", "  two lines.", "'''"]).as_deref(),
            Some("Spans two lines.")
        );
        assert!(docstring(&["    return 1"]).is_none());
    }

    #[test]
    fn leading_doc_skips_attributes() {
        let lines = ["/// Parses input.", "/// Fails on empty.", "#[must_use]"];
        assert_eq!(
            leading_doc(&lines).as_deref(),
            Some("Parses input. Fails on empty.")
        );
    }

    #[test]
    fn long_docs_are_cut() {
        let long = "x".repeat(DOC_CHARS + 50);
        let doc = join_doc(&[long.as_str()]).unwrap();
        assert_eq!(doc.chars().count(), DOC_CHARS + 3);
        assert!(doc.ends_with("..."));
    }

    #[test]
    fn unknown_language_has_imports_but_no_entries() {
        let outline = FileOutline::build(
            "notes.txt",
            "import this\nplain text\n",
            &BoundaryRegistry::with_defaults(),
        );
        assert_eq!(outline.language, None);
        assert_eq!(outline.line_count, 2);
        assert_eq!(outline.imports, ["import this"]);
        assert!(outline.entries.is_empty());
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_outline() {
        let source = "\"\"\"Session helpers.\"\"\"\nimport os\nfrom auth import token\n\n\
                      @cached\ndef open_session(user):\n    \"\"\"Open a session for user.\"\"\"\n    return token(user)\n\n\
                      class Store:\n    pass\n";
        let outline = FileOutline::build("auth/session.py", source, &BoundaryRegistry::with_defaults());

        assert_eq!(outline.language, Some("python"));
        assert_eq!(outline.module_doc.as_deref(), Some("Session helpers."));
        assert_eq!(outline.imports, ["import os", "from auth import token"]);
        let names: Vec<_> = outline.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["open_session", "Store"]);

        let f = &outline.entries[0];
        assert_eq!(f.kind, "function");
        assert_eq!(f.signature, "def open_session(user):");
        assert_eq!(f.start_line, 6);
        assert_eq!(f.doc.as_deref(), Some("Open a session for user."));
        assert_eq!(outline.entries[1].kind, "class");
        assert!(outline.to_string().contains("def open_session(user):"));
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn rust_outline() {
        let source = "//! Parsing.\n\nuse std::fmt;\n\n/// Parse a line.\n#[must_use]\npub fn parse(s: &str) -> usize {\n    s.len()\n}\n";
        let outline = FileOutline::build("src/parse.rs", source, &BoundaryRegistry::with_defaults());

        assert_eq!(outline.module_doc.as_deref(), Some("Parsing."));
        assert_eq!(outline.imports, ["use std::fmt;"]);
        assert_eq!(outline.entries.len(), 1);
        let e = &outline.entries[0];
        assert_eq!(e.name, "parse");
        assert_eq!(e.signature, "pub fn parse(s: &str) -> usize {");
        assert_eq!(e.doc.as_deref(), Some("Parse a line."));
        assert_eq!((e.start_line, e.end_line), (7, 9));
    }
}
