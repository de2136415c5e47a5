//! Single-line classification

use serde::{Deserialize, Serialize};

/// Category of one changed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Meaningful,
    Comment,
    Whitespace,
}

/// Comment prefixes across the languages we care about.
///
/// Order matters: `///` must be tried before `//`.
const COMMENT_PREFIXES: &[&str] = &[
    "///", "//", "#", "/**", "/*", "*/", "<!--", "-->", "--", ";", "'", "\"\"\"", "'''",
];

const DOC_COMMENT_PREFIXES: &[&str] = &["///", "//!", "/**", "/*!", "\"\"\"", "'''"];

/// Annotation lines inside doc blocks (`* @param`, `# @return`, ...)
const ANNOTATION_PREFIXES: &[&str] = &["* @", "// @", "# @"];

/// Markers stripped before looking at what a comment contains.
const COMMENT_MARKERS: &[&str] = &[
    "///", "//!", "//", "/**", "/*!", "/*", "*/", "<!--", "-->", "--", "#", ";", "*",
];

const CODE_KEYWORDS: &[&str] = &[
    "if ", "if(", "for ", "for(", "while ", "while(", "func ", "fn ", "def ", "return ", "return;",
    "import ", "from ", "let ", "var ", "const ", "class ", "struct ", "pub ", "else", "switch ",
    "case ", "package ", "use ", "#include", "public ", "private ", "static ",
];

const CODE_OPERATORS: &[&str] = &[
    " = ", " == ", " != ", " := ", " += ", " -= ", " <= ", " >= ", " && ", " || ", "===",
];

const CODE_ENDINGS: &[&str] = &[";", "{", "}", "(", ")", ",", ":", "=>", "->"];

/// Classify a single line of source.
///
/// Whitespace wins over everything else: a blank line is never a comment.
pub fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Whitespace;
    }
    if is_comment(trimmed) {
        LineKind::Comment
    } else {
        LineKind::Meaningful
    }
}

fn is_comment(trimmed: &str) -> bool {
    if COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return true;
    }
    is_block_continuation(trimmed)
}

/// `*` followed by whitespace, `/`, or nothing. Rejects `*ptr = value`.
fn is_block_continuation(trimmed: &str) -> bool {
    let Some(rest) = trimmed.strip_prefix('*') else {
        return false;
    };
    match rest.chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || c == '/',
    }
}

/// Doc-comment syntax or an annotation continuation line.
pub fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    DOC_COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || ANNOTATION_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Heuristic: does this comment line look like disabled code?
///
/// Looks at the text after the comment marker for trailing code punctuation,
/// a leading keyword, or an assignment/comparison operator. Known false
/// positives: prose ending in `:` or `)` ("// Note:", "// (see above)").
/// Known false negatives: bare expressions without punctuation ("// foo").
pub fn is_commented_out_code(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || !is_comment(trimmed) {
        return false;
    }

    let body = strip_comment_marker(trimmed);
    if body.is_empty() {
        return false;
    }

    CODE_ENDINGS.iter().any(|e| body.ends_with(e))
        || CODE_KEYWORDS.iter().any(|k| body.starts_with(k))
        || CODE_OPERATORS.iter().any(|op| body.contains(op))
}

fn strip_comment_marker(trimmed: &str) -> &str {
    for marker in COMMENT_MARKERS {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return rest.trim();
        }
    }
    trimmed
}
