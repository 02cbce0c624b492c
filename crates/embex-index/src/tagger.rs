//! Topic tags derived from chunk text.

use std::sync::LazyLock;

use regex::Regex;

const RULES: &[(&str, &str)] = &[
    (
        "auth",
        r"\b(auth|login|logout|signup|sign.?in|password|token|jwt|oauth|session)\b",
    ),
    (
        "database",
        r"\b(sql|query|insert|select|table|database|db|sqlite|postgres|mongo|orm|model|migration)\b",
    ),
    (
        "api",
        r"\b(api|endpoint|route|request|response|http|rest|graphql|middleware)\b",
    ),
    (
        "test",
        r"\b(test_\w*|assert\w*|pytest|jest|describe|expect|mock|fixture)\b",
    ),
    (
        "config",
        r"\b(config|settings?|env|yaml|json|toml|environment)\b",
    ),
    (
        "error-handling",
        r"\b(try|except|catch|raise|throw|error|exception|fail)\b",
    ),
    (
        "io",
        r"\b(file|read|write|open|path|stdin|stdout|stream|socket)\b",
    ),
    (
        "ui",
        r"\b(render|component|template|view|html|css|style|button|form)\b",
    ),
    (
        "async",
        r"\b(async|await|coroutine|task|future|promise|callback)\b",
    ),
    (
        "cli",
        r"\b(argparse|clap|click|typer|command|argument|flag|parser)\b",
    ),
];

static COMPILED: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|(tag, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((*tag, re)),
            Err(e) => {
                tracing::warn!(tag, "invalid tag rule: {e}");
                None
            }
        })
        .collect()
});

/// Tags in rule order, each at most once.
#[must_use]
pub fn auto_tag(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    COMPILED
        .iter()
        .filter(|(_, re)| re.is_match(&lower))
        .map(|(tag, _)| *tag)
        .collect()
}
