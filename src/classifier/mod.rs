//! Line-level change classification
//!
//! Decides whether a changed line is meaningful code, a comment or blank,
//! and whether a path is documentation or a test. Everything here is a pure
//! function over its input with no shared state, so it is safe to call from
//! any number of threads.
//!
//! # Example
//!
//! ```
//! use gitvelocity::classifier::{classify, classify_patch, LineKind};
//!
//! assert_eq!(classify("   "), LineKind::Whitespace);
//! assert_eq!(classify("// TODO"), LineKind::Comment);
//! assert_eq!(classify("let x = 1;"), LineKind::Meaningful);
//!
//! let stats = classify_patch("@@ -1,3 +1,5 @@\n context\n+// comment\n+x := 5");
//! assert_eq!(stats.comment_additions, 1);
//! assert_eq!(stats.meaningful_additions, 1);
//! ```

mod files;
mod lines;
mod patch;

pub use files::{is_documentation_file, is_test_file};
pub use lines::{classify, is_commented_out_code, is_doc_comment, LineKind};
pub use patch::{classify_patch, ChangeSide, LineStats};
