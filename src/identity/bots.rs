//! Bot account detection

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::models::Identity;

/// Patterns every run treats as bots.
pub const DEFAULT_BOT_PATTERNS: &[&str] = &[
    r"*\[bot\]",
    "dependabot*",
    "renovate*",
    "github-actions*",
    "greenkeeper*",
    "snyk-bot",
    "codecov*",
    "imgbot*",
    "allcontributors*",
    "mergify*",
    "semantic-release-bot",
    "pre-commit-ci*",
    "web-flow",
];

/// Case-insensitive glob predicate over logins.
#[derive(Debug, Clone)]
pub struct BotFilter {
    set: GlobSet,
}

impl BotFilter {
    /// Defaults plus `extra` patterns.
    pub fn new(extra: &[String]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        let patterns = DEFAULT_BOT_PATTERNS
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str));
        for pattern in patterns {
            builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    pub fn is_bot(&self, login: &str) -> bool {
        !login.is_empty() && self.set.is_match(login)
    }

    /// Git authors have no platform login, so the name is checked too.
    pub fn is_bot_identity(&self, identity: &Identity) -> bool {
        self.is_bot(&identity.login) || self.is_bot(identity.name.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns() -> Result<(), globset::Error> {
        let bots = BotFilter::new(&[])?;
        assert!(bots.is_bot("dependabot[bot]"));
        assert!(bots.is_bot("Dependabot-Preview"));
        assert!(bots.is_bot("renovate-bot"));
        assert!(bots.is_bot("github-actions"));
        assert!(bots.is_bot("some-app[bot]"));
        assert!(!bots.is_bot("octocat"));
        assert!(!bots.is_bot("robot")); // no [bot] suffix
        assert!(!bots.is_bot(""));
        Ok(())
    }

    #[test]
    fn test_extra_patterns() -> Result<(), globset::Error> {
        let bots = BotFilter::new(&["ci-*".to_string(), "deploy-bot".to_string()])?;
        assert!(bots.is_bot("CI-runner"));
        assert!(bots.is_bot("deploy-bot"));
        assert!(!bots.is_bot("deployer"));
        Ok(())
    }

    #[test]
    fn test_git_identities() -> Result<(), globset::Error> {
        use crate::models::LoginSource;

        let bots = BotFilter::new(&[])?;
        let noreply = Identity::from_signature(
            "dependabot[bot]",
            "49699333+dependabot[bot]@users.noreply.github.com",
            "dependabot[bot]".to_string(),
            LoginSource::Noreply,
        );
        assert!(bots.is_bot_identity(&noreply));
        let by_name = Identity::from_signature(
            "github-actions",
            "actions@example.com",
            "github-actions".to_string(),
            LoginSource::NameSlug,
        );
        assert!(bots.is_bot_identity(&by_name));
        assert!(!bots.is_bot_identity(&Identity::from_login("octocat")));
        Ok(())
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(BotFilter::new(&["[unclosed".to_string()]).is_err());
    }
}
