//! Boundary detection: splitting a file into semantic units by line range.
//!
//! A [`BoundaryRegistry`] maps file extensions to detectors. Anything not
//! registered, and any file a detector fails to parse, falls back to
//! [`WholeFile`], which the chunker then cuts into fixed windows.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tree_sitter::{Node, Parser};

use crate::languages::Lang;

/// A semantic unit covering lines `start..end` (0-based, end exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub start: usize,
    pub end: usize,
    pub kind: &'static str,
    pub name: Option<String>,
}

pub trait BoundaryDetector: Send + Sync {
    /// Units in source order, non-overlapping. `None` means the source could
    /// not be parsed and the caller should fall back to fixed windows.
    fn units(&self, source: &str) -> Option<Vec<Unit>>;

    fn language(&self) -> Option<Lang> {
        None
    }
}

/// Fallback detector: the whole file is one unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct WholeFile;

impl BoundaryDetector for WholeFile {
    fn units(&self, source: &str) -> Option<Vec<Unit>> {
        let lines = line_count(source);
        if lines == 0 {
            return Some(Vec::new());
        }
        Some(vec![Unit {
            start: 0,
            end: lines,
            kind: "window",
            name: None,
        }])
    }
}

/// Tree-sitter backed detector over top-level declarations.
#[derive(Debug, Clone, Copy)]
pub struct TreeSitterDetector {
    lang: Lang,
}

impl TreeSitterDetector {
    #[must_use]
    pub fn new(lang: Lang) -> Self {
        Self { lang }
    }
}

impl BoundaryDetector for TreeSitterDetector {
    fn units(&self, source: &str) -> Option<Vec<Unit>> {
        let grammar = self.lang.grammar()?;
        let mut parser = Parser::new();
        parser.set_language(&grammar).ok()?;
        let tree = parser.parse(source, None)?;
        let root = tree.root_node();
        if root.has_error() {
            tracing::debug!(lang = %self.lang, "syntax errors, falling back to fixed windows");
            return None;
        }
        Some(collect_units(self.lang, &root, source))
    }

    fn language(&self) -> Option<Lang> {
        Some(self.lang)
    }
}

/// Extension → detector map with a whole-file fallback.
#[derive(Clone)]
pub struct BoundaryRegistry {
    by_extension: HashMap<String, Arc<dyn BoundaryDetector>>,
    fallback: Arc<dyn BoundaryDetector>,
}

impl BoundaryRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
            fallback: Arc::new(WholeFile),
        }
    }

    /// Registry covering every language whose grammar feature is enabled.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        let table: &[(Lang, &[&str])] = &[
            (Lang::Rust, &["rs"]),
            (Lang::Python, &["py", "pyi"]),
            (Lang::JavaScript, &["js", "jsx", "mjs", "cjs"]),
            (Lang::TypeScript, &["ts", "tsx", "mts", "cts"]),
            (Lang::Go, &["go"]),
        ];
        for (lang, exts) in table {
            if lang.grammar().is_none() {
                continue;
            }
            let detector: Arc<dyn BoundaryDetector> = Arc::new(TreeSitterDetector::new(*lang));
            for ext in *exts {
                registry.by_extension.insert((*ext).to_owned(), Arc::clone(&detector));
            }
        }
        registry
    }

    pub fn register(&mut self, extension: &str, detector: Arc<dyn BoundaryDetector>) {
        self.by_extension
            .insert(extension.trim_start_matches('.').to_owned(), detector);
    }

    #[must_use]
    pub fn detector_for(&self, path: &Path) -> &dyn BoundaryDetector {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.by_extension.get(e))
            .map_or(self.fallback.as_ref(), |d| d.as_ref())
    }

    #[must_use]
    pub fn fallback(&self) -> &dyn BoundaryDetector {
        self.fallback.as_ref()
    }
}

impl Default for BoundaryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for BoundaryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut exts: Vec<_> = self.by_extension.keys().collect();
        exts.sort();
        f.debug_struct("BoundaryRegistry")
            .field("extensions", &exts)
            .finish_non_exhaustive()
    }
}

/// Number of lines, counting a trailing unterminated line.
#[must_use]
pub fn line_count(source: &str) -> usize {
    source.split_inclusive('\n').count()
}

fn is_leading_trivia(kind: &str) -> bool {
    kind.contains("comment") || kind == "attribute_item" || kind == "decorator"
}

fn end_line_exclusive(node: &Node) -> usize {
    let end = node.end_position();
    // A node ending at column 0 does not occupy that row.
    if end.column == 0 && end.row > node.start_position().row {
        end.row
    } else {
        end.row + 1
    }
}

fn collect_units(lang: Lang, root: &Node, source: &str) -> Vec<Unit> {
    let entity_kinds = lang.entity_node_kinds();
    let mut units: Vec<Unit> = Vec::new();
    let mut module_run: Option<(usize, usize)> = None;
    let mut trivia_start: Option<usize> = None;
    let mut trivia_end = 0usize;

    let child_count = u32::try_from(root.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = root.named_child(i) else {
            continue;
        };
        let start = child.start_position().row;
        let end = end_line_exclusive(&child);

        if is_leading_trivia(child.kind()) {
            trivia_start.get_or_insert(start);
            trivia_end = trivia_end.max(end);
            continue;
        }

        if entity_kinds.contains(&child.kind()) {
            if let Some(run) = module_run.take() {
                push_unit(&mut units, run.0, run.1, "module", None);
            }
            let unit_start = trivia_start.take().unwrap_or(start);
            let kind = lang.unit_kind(declared_kind(&child));
            push_unit(&mut units, unit_start, end, kind, entity_name(&child, source));
        } else {
            let run_start = trivia_start.take().unwrap_or(start);
            module_run = Some(match module_run {
                Some((s, e)) => (s, e.max(end)),
                None => (run_start, end),
            });
        }
    }

    if let Some(ts) = trivia_start {
        module_run = Some(match module_run {
            Some((s, e)) => (s, e.max(trivia_end)),
            None => (ts, trivia_end),
        });
    }
    if let Some(run) = module_run {
        push_unit(&mut units, run.0, run.1, "module", None);
    }
    units
}

/// Append a unit, folding it into the previous one when their lines overlap.
fn push_unit(
    units: &mut Vec<Unit>,
    start: usize,
    end: usize,
    kind: &'static str,
    name: Option<String>,
) {
    if let Some(last) = units.last_mut()
        && start < last.end
    {
        last.end = last.end.max(end);
        if last.name.is_none() {
            last.name = name;
        }
        return;
    }
    units.push(Unit {
        start,
        end,
        kind,
        name,
    });
}

fn declared_kind(node: &Node) -> &'static str {
    for field in ["declaration", "definition"] {
        if let Some(inner) = node.child_by_field_name(field) {
            return inner.kind();
        }
    }
    node.kind()
}

fn entity_name(node: &Node, source: &str) -> Option<String> {
    // tree-sitter-rust: impl_item uses "type", most others use "name"
    if let Some(n) = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
    {
        return Some(source[n.byte_range()].to_string());
    }
    for field in ["declaration", "definition"] {
        if let Some(inner) = node.child_by_field_name(field) {
            return entity_name(&inner, source);
        }
    }
    // lexical_declaration / type_declaration wrap their named specs
    let first = node.named_child(0)?;
    first
        .child_by_field_name("name")
        .map(|n| source[n.byte_range()].to_string())
}
