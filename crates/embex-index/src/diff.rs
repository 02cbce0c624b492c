use serde::Serialize;
use similar::{Algorithm, ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Added,
    Removed,
}

/// One inserted or deleted line. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    /// Position in the old version (removed lines only).
    pub old_line: Option<usize>,
    /// Position in the new version (added lines only).
    pub new_line: Option<usize>,
    pub content: String,
}

/// LCS line diff between two versions of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub from: u32,
    pub to: u32,
    pub lines: Vec<DiffLine>,
    #[serde(skip)]
    unified: String,
}

impl FileDiff {
    #[must_use]
    pub fn compute(path: &str, from: u32, old: &str, to: u32, new: &str) -> Self {
        let diff = TextDiff::configure()
            .algorithm(Algorithm::Lcs)
            .diff_lines(old, new);

        let lines = diff
            .iter_all_changes()
            .filter_map(|change| {
                let kind = match change.tag() {
                    ChangeTag::Delete => DiffLineKind::Removed,
                    ChangeTag::Insert => DiffLineKind::Added,
                    ChangeTag::Equal => return None,
                };
                Some(DiffLine {
                    kind,
                    old_line: change.old_index().map(|i| i + 1),
                    new_line: change.new_index().map(|i| i + 1),
                    content: change.value().trim_end_matches(['\n', '\r']).to_owned(),
                })
            })
            .collect();

        let unified = if old == new {
            String::new()
        } else {
            diff.unified_diff()
                .context_radius(3)
                .header(&format!("{path}@v{from}"), &format!("{path}@v{to}"))
                .to_string()
        };

        Self {
            path: path.to_owned(),
            from,
            to,
            lines,
            unified,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn added(&self) -> usize {
        self.count(DiffLineKind::Added)
    }

    #[must_use]
    pub fn removed(&self) -> usize {
        self.count(DiffLineKind::Removed)
    }

    /// Unified diff text with three lines of context; empty when identical.
    #[must_use]
    pub fn to_unified(&self) -> &str {
        &self.unified
    }

    fn count(&self, kind: DiffLineKind) -> usize {
        self.lines.iter().filter(|l| l.kind == kind).count()
    }
}
