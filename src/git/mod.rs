//! Local git history
//!
//! Extracts commits from local clones, keeping every branch and tag in
//! view, and manages the clone directory those commits come from.
//!
//! # Example
//!
//! ```no_run
//! use gitvelocity::cancel::CancellationToken;
//! use gitvelocity::git::{ExtractOptions, GitHistory};
//! use gitvelocity::models::{DateRange, RepoRef};
//! use gitvelocity::progress::NullReporter;
//! use std::path::Path;
//!
//! let history = GitHistory::open(Path::new("/path/to/clone")).unwrap();
//! let commits = history
//!     .extract_commits(
//!         &RepoRef::new("acme", "widgets"),
//!         &DateRange::default(),
//!         &ExtractOptions::default(),
//!         &CancellationToken::new(),
//!         &NullReporter,
//!     )
//!     .unwrap();
//! println!("{} commits", commits.len());
//! ```

pub mod clone;
pub mod history;
pub mod login;

pub use clone::{clone_path, ensure_local_clone, CloneOptions};
pub use history::{ExtractOptions, GitHistory, SeenCommits, StopReason, WalkStep};
pub use login::{infer_login, login_from_noreply, slugify};
