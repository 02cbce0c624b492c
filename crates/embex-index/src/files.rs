//! Which project files are indexed, and how their paths are spelled.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::error::{IndexError, Result};

/// Project-local state directory, never indexed.
pub const STATE_DIR: &str = ".embex";

/// Raw eligibility rules as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRules {
    /// Allowed extensions with leading dot; empty allows every extension.
    pub include_extensions: Vec<String>,
    /// Directory names skipped at any depth.
    pub exclude_dirs: Vec<String>,
    /// Filename globs, e.g. `*.min.js`.
    pub exclude_files: Vec<String>,
}

impl Default for FileRules {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();
        Self {
            include_extensions: owned(&[
                ".py", ".js", ".ts", ".jsx", ".tsx", ".go", ".rs", ".java", ".cpp", ".c", ".rb",
                ".php", ".swift", ".kt",
            ]),
            exclude_dirs: owned(&[
                "node_modules",
                "__pycache__",
                ".git",
                STATE_DIR,
                "dist",
                "build",
                ".venv",
                "venv",
                "target",
            ]),
            exclude_files: owned(&["*.test.*", "*.spec.*", "*.min.js"]),
        }
    }
}

/// Compiled [`FileRules`] bound to a project root.
#[derive(Debug, Clone)]
pub struct FileFilter {
    root: PathBuf,
    extensions: HashSet<String>,
    exclude_dirs: HashSet<String>,
    exclude_files: Vec<glob::Pattern>,
}

impl FileFilter {
    /// # Errors
    ///
    /// Returns `InvalidConfig` if an exclude glob does not parse.
    pub fn new(root: impl Into<PathBuf>, rules: &FileRules) -> Result<Self> {
        let exclude_files = rules
            .exclude_files
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| IndexError::InvalidConfig(format!("exclude pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut exclude_dirs: HashSet<String> = rules.exclude_dirs.iter().cloned().collect();
        exclude_dirs.insert(STATE_DIR.to_owned());

        Ok(Self {
            root: root.into(),
            extensions: rules
                .include_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            exclude_dirs,
            exclude_files,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a project-relative path should be indexed.
    #[must_use]
    pub fn is_eligible(&self, rel: &str) -> bool {
        let mut parts: Vec<&str> = rel.split('/').filter(|p| !p.is_empty()).collect();
        let Some(file_name) = parts.pop() else {
            return false;
        };
        if parts.iter().any(|d| self.exclude_dirs.contains(*d)) {
            return false;
        }
        if self.exclude_files.iter().any(|p| p.matches(file_name)) {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&format!(".{}", e.to_lowercase())))
    }

    /// Project-relative, forward-slash form of an absolute path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `abs` lies outside the project root.
    pub fn relative(&self, abs: &Path) -> Result<String> {
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| IndexError::InvalidPath(abs.display().to_string()))?;
        normalize_relative(rel)
    }

    /// Canonical key for a user-supplied relative path: forward slashes, no
    /// `.` segments, no repeated or trailing separators.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for empty, absolute or escaping paths.
    pub fn normalize(rel: &str) -> Result<String> {
        normalize_relative(Path::new(&rel.replace('\\', "/")))
    }

    /// Absolute location of a project-relative path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for absolute paths or paths escaping the root.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let clean = normalize_relative(Path::new(rel))?;
        Ok(self.root.join(clean))
    }

    /// Eligible files on disk, honouring `.gitignore`, sorted.
    #[must_use]
    pub fn walk(&self) -> Vec<String> {
        let exclude_dirs = self.exclude_dirs.clone();
        let mut builder = ignore::WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .filter_entry(move |entry| {
                !(entry.file_type().is_some_and(|ft| ft.is_dir())
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|n| exclude_dirs.contains(n)))
            });

        let mut out = Vec::new();
        for result in builder.build() {
            match result {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                        continue;
                    }
                    match self.relative(entry.path()) {
                        Ok(rel) if self.is_eligible(&rel) => out.push(rel),
                        Ok(_) => {}
                        Err(e) => tracing::debug!("skipping {}: {e}", entry.path().display()),
                    }
                }
                Err(e) => tracing::warn!("walk error: {e}"),
            }
        }
        out.sort();
        out
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

fn normalize_relative(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(p) => parts.push(
                p.to_str()
                    .ok_or_else(|| IndexError::InvalidPath(rel.display().to_string()))?
                    .to_owned(),
            ),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(IndexError::InvalidPath(rel.display().to_string()));
            }
        }
    }
    if parts.is_empty() {
        return Err(IndexError::InvalidPath(rel.display().to_string()));
    }
    Ok(parts.join("/"))
}
