//! Path classification

const DOC_EXTENSIONS: &[&str] = &[".md", ".markdown", ".rst", ".adoc", ".asciidoc", ".txt"];

const DOC_FILENAMES: &[&str] = &[
    "readme",
    "changelog",
    "changes",
    "history",
    "license",
    "licence",
    "contributing",
    "authors",
    "contributors",
    "code_of_conduct",
    "notice",
    "copying",
];

const DOC_DIRS: &[&str] = &["docs/", "doc/", "documentation/"];

const TEST_PATTERNS: &[&str] = &["_test.go", ".test.", ".spec.", "/tests/", "/test/", "__tests__"];

/// Documentation-only path (excluded from line and file counts).
pub fn is_documentation_file(path: &str) -> bool {
    let lower = normalize(path);

    if DOC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return true;
    }

    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    let stem = file_name.split('.').next().unwrap_or(file_name);
    // `LICENSE-MIT`, `README-ja` and friends
    if DOC_FILENAMES
        .iter()
        .any(|n| stem == *n || stem.strip_prefix(n).is_some_and(|r| r.starts_with('-')))
    {
        return true;
    }

    DOC_DIRS
        .iter()
        .any(|dir| lower.starts_with(&format!("/{dir}")) || lower.contains(&format!("/{dir}")))
}

/// Test source path (sets the commit's `has_tests` flag).
pub fn is_test_file(path: &str) -> bool {
    let lower = normalize(path);
    TEST_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Lowercase with a leading `/` so directory fragments match at the root too.
fn normalize(path: &str) -> String {
    let lower = path.replace('\\', "/").to_lowercase();
    if lower.starts_with('/') {
        lower
    } else {
        format!("/{lower}")
    }
}
