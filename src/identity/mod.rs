//! Identity reconciliation
//!
//! Git history knows people by name and email, the platform knows them by
//! login. [`reconcile`] builds an [`IdentityMap`] that resolves any raw
//! [`Identity`] to one canonical, lower-cased login. Rules are tried in
//! priority order:
//!
//! 1. configured aliases (email, then normalized name)
//! 2. public email of a known profile
//! 3. the platform login already carried by the identity
//! 4. normalized display name against known profile names
//! 5. the identity's own slug (an "unknown" contributor)
//!
//! Known profiles are the fetched user profiles plus every platform
//! identity seen on pull requests, reviews and noreply commits. When
//! several profiles share a display name, the first login in sorted order
//! wins.

mod bots;

pub use bots::{BotFilter, DEFAULT_BOT_PATTERNS};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::git::slugify;
use crate::github::UserProfile;
use crate::models::{Commit, Identity, LoginSource, PullRequest, Review};

/// User-supplied mapping of emails and names onto a login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub login: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
}

/// Which rule resolved an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Alias,
    ProfileEmail,
    PlatformLogin,
    ProfileName,
    Fallback,
}

/// Display information for a canonical contributor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Contributor {
    fn new(login: &str) -> Self {
        Self {
            login: login.to_string(),
            ..Default::default()
        }
    }

    fn absorb(&mut self, identity: &Identity) {
        if self.name.is_none() && !identity.name.trim().is_empty() {
            self.name = Some(identity.name.trim().to_string());
        }
        if self.avatar_url.is_none() {
            self.avatar_url = identity.avatar_url.clone();
        }
    }
}

/// Resolves raw identities to canonical logins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    alias_emails: BTreeMap<String, String>,
    alias_names: BTreeMap<String, String>,
    profile_emails: BTreeMap<String, String>,
    profile_names: BTreeMap<String, String>,
    contributors: BTreeMap<String, Contributor>,
}

impl IdentityMap {
    /// Canonical login for `identity` and the rule that produced it.
    pub fn resolve(&self, identity: &Identity) -> (String, MatchRule) {
        let email = normalize_email(&identity.email);
        let name = slugify(&identity.name);

        if let Some(login) =
            lookup(&self.alias_emails, &email).or_else(|| lookup(&self.alias_names, &name))
        {
            return (login.clone(), MatchRule::Alias);
        }
        if let Some(login) = lookup(&self.profile_emails, &email) {
            return (login.clone(), MatchRule::ProfileEmail);
        }
        if let Some(login) = identity.platform_login() {
            return (login.to_lowercase(), MatchRule::PlatformLogin);
        }
        if let Some(login) = lookup(&self.profile_names, &name) {
            return (login.clone(), MatchRule::ProfileName);
        }
        (fallback_key(identity), MatchRule::Fallback)
    }

    pub fn canonical(&self, identity: &Identity) -> String {
        self.resolve(identity).0
    }

    pub fn contributor(&self, login: &str) -> Option<&Contributor> {
        self.contributors.get(login)
    }

    /// Display info for `login`, bare if the login was never seen.
    pub fn display(&self, login: &str) -> Contributor {
        self.contributors
            .get(login)
            .cloned()
            .unwrap_or_else(|| Contributor::new(login))
    }

    pub fn contributors(&self) -> impl Iterator<Item = &Contributor> {
        self.contributors.values()
    }
}

#[derive(Default)]
struct ProfileEntry {
    name: Option<String>,
    emails: BTreeSet<String>,
    avatar_url: Option<String>,
}

impl ProfileEntry {
    fn absorb(&mut self, name: Option<&str>, email: Option<&str>, avatar_url: Option<&String>) {
        if self.name.is_none() {
            self.name = name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);
        }
        if let Some(email) = email.map(normalize_email).filter(|e| !e.is_empty()) {
            self.emails.insert(email);
        }
        if self.avatar_url.is_none() {
            self.avatar_url = avatar_url.cloned();
        }
    }
}

/// Build the identity map for one run.
pub fn reconcile<'r>(
    commits: &[Commit],
    pull_requests: &[PullRequest],
    reviews: impl IntoIterator<Item = &'r Review>,
    profiles: &BTreeMap<String, UserProfile>,
    aliases: &[Alias],
) -> IdentityMap {
    let reviews: Vec<&Review> = reviews.into_iter().collect();
    let mut map = IdentityMap::default();

    for alias in aliases {
        let login = alias.login.trim().to_lowercase();
        if login.is_empty() {
            continue;
        }
        for email in alias.emails.iter().map(|e| normalize_email(e)) {
            if !email.is_empty() {
                map.alias_emails.entry(email).or_insert_with(|| login.clone());
            }
        }
        for name in alias.names.iter().map(|n| slugify(n)) {
            if !name.is_empty() {
                map.alias_names.entry(name).or_insert_with(|| login.clone());
            }
        }
    }

    let mut table: BTreeMap<String, ProfileEntry> = BTreeMap::new();
    for (login, profile) in profiles {
        table.entry(login.to_lowercase()).or_default().absorb(
            profile.name.as_deref(),
            profile.email.as_deref(),
            profile.avatar_url.as_ref(),
        );
    }
    let platform_identities = pull_requests
        .iter()
        .map(|pr| &pr.author)
        .chain(reviews.iter().map(|r| &r.author))
        .chain(
            commits
                .iter()
                .map(|c| &c.author)
                .filter(|a| a.login_source == LoginSource::Noreply),
        );
    for identity in platform_identities {
        if let Some(login) = identity.platform_login() {
            table.entry(login.to_lowercase()).or_default().absorb(
                Some(identity.name.as_str()),
                Some(identity.email.as_str()),
                identity.avatar_url.as_ref(),
            );
        }
    }

    // BTreeMap order makes "first profile wins" deterministic
    for (login, entry) in &table {
        for email in &entry.emails {
            map.profile_emails
                .entry(email.clone())
                .or_insert_with(|| login.clone());
        }
        if let Some(name) = entry.name.as_deref().map(slugify).filter(|n| !n.is_empty()) {
            map.profile_names.entry(name).or_insert_with(|| login.clone());
        }
        map.contributors.insert(
            login.clone(),
            Contributor {
                login: login.clone(),
                name: entry.name.clone(),
                avatar_url: entry.avatar_url.clone(),
            },
        );
    }

    let seen = commits
        .iter()
        .map(|c| &c.author)
        .chain(pull_requests.iter().map(|pr| &pr.author))
        .chain(reviews.iter().map(|r| &r.author));
    for identity in seen {
        let login = map.canonical(identity);
        map.contributors
            .entry(login.clone())
            .or_insert_with(|| Contributor::new(&login))
            .absorb(identity);
    }

    map
}

fn lookup<'m>(index: &'m BTreeMap<String, String>, key: &str) -> Option<&'m String> {
    if key.is_empty() {
        None
    } else {
        index.get(key)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn fallback_key(identity: &Identity) -> String {
    if !identity.login.is_empty() {
        return identity.login.to_lowercase();
    }
    let name = slugify(&identity.name);
    if !name.is_empty() {
        return name;
    }
    let local = identity
        .email
        .split('@')
        .next()
        .map(slugify)
        .unwrap_or_default();
    if !local.is_empty() {
        return local;
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LineStats;
    use crate::git::infer_login;
    use crate::models::PrState;
    use chrono::{DateTime, Utc};

    fn no_reviews() -> Vec<&'static Review> {
        Vec::new()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn author(name: &str, email: &str) -> Identity {
        let (login, source) = infer_login(name, email);
        Identity::from_signature(name, email, login, source)
    }

    fn commit(hash: &str, name: &str, email: &str) -> Commit {
        let author = author(name, email);
        Commit {
            hash: hash.into(),
            repository: "acme/widgets".into(),
            committer: author.clone(),
            author,
            timestamp: DateTime::parse_from_rfc3339("2024-03-04T10:00:00+00:00").unwrap(),
            message: "change".into(),
            stats: LineStats::default(),
            files_changed: 1,
            has_tests: false,
            is_merge: false,
        }
    }

    fn pull(number: u64, author: Identity) -> PullRequest {
        PullRequest {
            number,
            repository: "acme/widgets".into(),
            title: "Change".into(),
            state: PrState::Open,
            author,
            base_branch: "main".into(),
            head_branch: "topic".into(),
            created_at: ts("2024-03-04T10:00:00Z"),
            merged_at: None,
            closed_at: None,
            additions: 1,
            deletions: 0,
            files_changed: 1,
            commit_count: 1,
            reviews: Vec::new(),
            time_to_merge_hours: None,
            time_to_first_review_hours: None,
        }
    }

    fn profile(login: &str, name: Option<&str>, email: Option<&str>) -> (String, UserProfile) {
        (
            login.to_string(),
            UserProfile {
                login: login.to_string(),
                id: None,
                name: name.map(str::to_string),
                email: email.map(str::to_string),
                avatar_url: Some(format!("https://avatars.example/{}", login)),
            },
        )
    }

    #[test]
    fn test_alias_merges_email_with_login() {
        let commits = vec![commit("a1", "J. Doe", "jdoe@company.com")];
        let pulls = vec![pull(1, Identity::from_login("johndoe"))];
        let aliases = vec![Alias {
            login: "johndoe".into(),
            emails: vec!["jdoe@company.com".into()],
            names: Vec::new(),
        }];
        let map = reconcile(&commits, &pulls, no_reviews(), &BTreeMap::new(), &aliases);

        assert_eq!(
            map.resolve(&commits[0].author),
            ("johndoe".to_string(), MatchRule::Alias)
        );
        assert_eq!(map.canonical(&pulls[0].author), "johndoe");
        assert_eq!(map.contributors().count(), 1);
        assert_eq!(
            map.contributor("johndoe").and_then(|c| c.name.clone()),
            Some("J. Doe".to_string())
        );
    }

    #[test]
    fn test_alias_by_name_beats_profile_email() {
        let profiles: BTreeMap<_, _> =
            [profile("other", None, Some("shared@example.com"))].into_iter().collect();
        let aliases = vec![Alias {
            login: "Mine".into(),
            emails: Vec::new(),
            names: vec!["Sam Jones".into()],
        }];
        let map = reconcile(&[], &[], no_reviews(), &profiles, &aliases);
        let id = author("sam  JONES", "shared@example.com");
        assert_eq!(map.resolve(&id), ("mine".to_string(), MatchRule::Alias));
    }

    #[test]
    fn test_profile_email_match() {
        let profiles: BTreeMap<_, _> =
            [profile("octocat", Some("The Octocat"), Some("octo@example.com"))]
                .into_iter()
                .collect();
        let map = reconcile(&[], &[], no_reviews(), &profiles, &[]);
        let id = author("Laptop User", "OCTO@example.com ");
        assert_eq!(
            map.resolve(&id),
            ("octocat".to_string(), MatchRule::ProfileEmail)
        );
        assert_eq!(
            map.display("octocat").avatar_url.as_deref(),
            Some("https://avatars.example/octocat")
        );
    }

    #[test]
    fn test_platform_login_is_lowercased() {
        let map = IdentityMap::default();
        assert_eq!(
            map.resolve(&Identity::from_login("Alice")),
            ("alice".to_string(), MatchRule::PlatformLogin)
        );
        let noreply = author("Mona", "1+MonaLisa@users.noreply.github.com");
        assert_eq!(map.canonical(&noreply), "monalisa");
    }

    #[test]
    fn test_name_slug_does_not_preempt_profile_name() {
        let profiles: BTreeMap<_, _> =
            [profile("mona", Some("Mona Lisa"), None)].into_iter().collect();
        let map = reconcile(&[], &[], no_reviews(), &profiles, &[]);
        let id = author("mona lisa", "ml@laptop.local");
        assert_eq!(
            map.resolve(&id),
            ("mona".to_string(), MatchRule::ProfileName)
        );
    }

    #[test]
    fn test_name_tie_break_is_first_login() {
        let profiles: BTreeMap<_, _> = [
            profile("zed", Some("Sam Smith"), None),
            profile("amy", Some("Sam Smith"), None),
        ]
        .into_iter()
        .collect();
        let map = reconcile(&[], &[], no_reviews(), &profiles, &[]);
        assert_eq!(map.canonical(&author("Sam Smith", "sam@home.net")), "amy");
    }

    #[test]
    fn test_noreply_commit_teaches_name() {
        let commits = vec![
            commit("a1", "The Octocat", "583231+octocat@users.noreply.github.com"),
            commit("a2", "The Octocat", "cat@laptop.local"),
        ];
        let map = reconcile(&commits, &[], no_reviews(), &BTreeMap::new(), &[]);
        assert_eq!(map.canonical(&commits[0].author), "octocat");
        assert_eq!(
            map.resolve(&commits[1].author),
            ("octocat".to_string(), MatchRule::ProfileName)
        );
    }

    #[test]
    fn test_review_authors_are_profiles() {
        let mut reviewer = Identity::from_login("ReviewBot2000");
        reviewer.email = "rb@example.com".into();
        let review = Review {
            id: 1,
            pr_number: 1,
            author: reviewer,
            state: crate::models::ReviewState::Approved,
            submitted_at: None,
            body: String::new(),
            comment_count: 0,
            response_time_hours: None,
        };
        let map = reconcile(&[], &[], [&review], &BTreeMap::new(), &[]);
        assert_eq!(
            map.resolve(&author("Someone", "rb@example.com")),
            ("reviewbot2000".to_string(), MatchRule::ProfileEmail)
        );
    }

    #[test]
    fn test_fallback_keys() {
        let map = IdentityMap::default();
        assert_eq!(
            map.resolve(&author("Ghost Writer", "gw@nowhere.invalid")),
            ("ghost-writer".to_string(), MatchRule::Fallback)
        );
        assert_eq!(
            map.canonical(&Identity::from_signature("", "x.y@z.org", String::new(), LoginSource::NameSlug)),
            "x-y"
        );
        assert_eq!(map.canonical(&Identity::default()), "unknown");
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let commits = vec![
            commit("a1", "Ann Lee", "ann@corp.com"),
            commit("a2", "Bob Ray", "bob@corp.com"),
            commit("a3", "ann lee", "ann@home.net"),
        ];
        let pulls = vec![
            pull(1, Identity::from_login("annlee")),
            pull(2, Identity::from_login("bob")),
        ];
        let profiles: BTreeMap<_, _> = [
            profile("annlee", Some("Ann Lee"), Some("ann@corp.com")),
            profile("bob", Some("Bob Ray"), None),
        ]
        .into_iter()
        .collect();

        let first = reconcile(&commits, &pulls, no_reviews(), &profiles, &[]);
        let second = reconcile(&commits, &pulls, no_reviews(), &profiles, &[]);
        assert_eq!(first, second);

        let logins: BTreeSet<String> = commits.iter().map(|c| first.canonical(&c.author)).collect();
        assert_eq!(
            logins.into_iter().collect::<Vec<_>>(),
            vec!["annlee".to_string(), "bob".to_string()]
        );
    }
}
