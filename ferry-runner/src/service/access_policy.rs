//! Source access policy
//!
//! Decides whether a worker may contact an import's source URL before the
//! driver runs.

use clap::ValueEnum;
use reqwest::Url;

/// Schemes the default policy lets through
pub const ALLOWED_SCHEMES: [&str; 6] = ["http", "https", "svn", "git", "ftp", "bzr"];

/// Policy selected on the worker command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AccessPolicyKind {
    /// Any URL may be imported
    Anything,
    /// Known schemes only, never a blacklisted host
    #[default]
    Default,
}

impl AccessPolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPolicyKind::Anything => "anything",
            AccessPolicyKind::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
    Anything,
    Default { blacklisted_hostnames: Vec<String> },
}

impl AccessPolicy {
    pub fn new(kind: AccessPolicyKind, blacklisted_hostnames: &[String]) -> Self {
        match kind {
            AccessPolicyKind::Anything => AccessPolicy::Anything,
            AccessPolicyKind::Default => AccessPolicy::Default {
                blacklisted_hostnames: blacklisted_hostnames
                    .iter()
                    .map(|h| h.trim().to_ascii_lowercase())
                    .filter(|h| !h.is_empty())
                    .collect(),
            },
        }
    }

    /// Checks `url`; the error explains why it is forbidden
    pub fn check(&self, url: &str) -> Result<(), String> {
        let blacklisted_hostnames = match self {
            AccessPolicy::Anything => return Ok(()),
            AccessPolicy::Default {
                blacklisted_hostnames,
            } => blacklisted_hostnames,
        };

        let parsed = Url::parse(url).map_err(|e| format!("{} is not a valid URL: {}", url, e))?;

        if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
            return Err(format!(
                "scheme '{}' is not allowed for imports",
                parsed.scheme()
            ));
        }

        let host = parsed
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| format!("{} has no host", url))?;

        let blocked = blacklisted_hostnames
            .iter()
            .any(|b| host == *b || host.ends_with(&format!(".{}", b)));
        if blocked {
            return Err(format!("host {} is blacklisted", host));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_policy() -> AccessPolicy {
        AccessPolicy::new(
            AccessPolicyKind::Default,
            &["Internal.example.com".to_string(), "localhost".to_string()],
        )
    }

    #[test]
    fn test_allowed_urls() {
        let policy = default_policy();
        assert!(policy.check("https://git.example.org/widget.git").is_ok());
        assert!(policy.check("svn://svn.example.org/trunk").is_ok());
        assert!(policy.check("bzr://bzr.example.org/widget").is_ok());
        assert!(policy.check("ftp://ftp.example.org/pub/widget").is_ok());
    }

    #[test]
    fn test_disallowed_schemes() {
        let policy = default_policy();
        assert!(policy.check("file:///etc/passwd").is_err());
        assert!(policy.check("svn+ssh://svn.example.org/trunk").is_err());
        assert!(policy.check("sftp://example.org/widget").is_err());
    }

    #[test]
    fn test_blacklisted_hosts_and_subdomains() {
        let policy = default_policy();
        assert!(policy.check("http://localhost/repo").is_err());
        assert!(policy.check("http://internal.example.com/repo").is_err());
        assert!(policy.check("https://git.INTERNAL.example.com/repo").is_err());
        // Only whole labels match
        assert!(policy.check("https://notinternal.example.com/repo").is_ok());
    }

    #[test]
    fn test_unparseable_url_is_forbidden() {
        assert!(default_policy().check("not a url").is_err());
    }

    #[test]
    fn test_anything_policy() {
        let policy = AccessPolicy::new(AccessPolicyKind::Anything, &["localhost".to_string()]);
        assert!(policy.check("file:///etc/passwd").is_ok());
        assert!(policy.check("http://localhost/repo").is_ok());
    }
}
