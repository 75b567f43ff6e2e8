//! Import source details
//!
//! Workers never read the database, so everything they need to know about an
//! import travels as a flat argument vector produced by the scheduler:
//!
//! ```text
//! <target_id> <rcs>:<target_rcs> <url>                 (bzr, bzr-svn, git)
//! <target_id> <rcs>:<target_rcs> <cvs_root> <module>   (cvs)
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Version control system an import reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RcsType {
    Bzr,
    BzrSvn,
    Cvs,
    Git,
}

/// Version control system the hosted copy is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetRcsType {
    Bzr,
    Git,
}

/// Where the foreign data lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceLocation {
    Url(String),
    Cvs { root: String, module: String },
}

/// Everything a worker needs to run one import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDetails {
    /// Identifier of the hosted branch or repository
    pub target_id: String,
    pub rcs_type: RcsType,
    pub target_rcs_type: TargetRcsType,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    #[error("missing argument: {0}")]
    Missing(&'static str),

    #[error("malformed import kind '{0}', expected <rcs>:<target_rcs>")]
    MalformedKind(String),

    #[error("unknown revision control system '{0}'")]
    UnknownRcs(String),

    #[error("unexpected trailing arguments: {0:?}")]
    Trailing(Vec<String>),
}

impl RcsType {
    /// Name used in worker arguments
    pub fn arg_name(&self) -> &'static str {
        match self {
            RcsType::Bzr => "bzr",
            RcsType::BzrSvn => "bzr-svn",
            RcsType::Cvs => "cvs",
            RcsType::Git => "git",
        }
    }

    /// Name stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            RcsType::Bzr => "BZR",
            RcsType::BzrSvn => "BZR_SVN",
            RcsType::Cvs => "CVS",
            RcsType::Git => "GIT",
        }
    }

    pub fn from_arg_name(s: &str) -> Option<Self> {
        match s {
            "bzr" => Some(RcsType::Bzr),
            "bzr-svn" => Some(RcsType::BzrSvn),
            "cvs" => Some(RcsType::Cvs),
            "git" => Some(RcsType::Git),
            _ => None,
        }
    }

    /// Whether imports of this kind are located by a single URL
    pub fn uses_url(&self) -> bool {
        !matches!(self, RcsType::Cvs)
    }
}

impl FromStr for RcsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BZR" => Ok(RcsType::Bzr),
            "BZR_SVN" => Ok(RcsType::BzrSvn),
            "CVS" => Ok(RcsType::Cvs),
            "GIT" => Ok(RcsType::Git),
            _ => Err(format!("unknown rcs type: {}", s)),
        }
    }
}

impl std::fmt::Display for RcsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.arg_name())
    }
}

impl TargetRcsType {
    pub fn arg_name(&self) -> &'static str {
        match self {
            TargetRcsType::Bzr => "bzr",
            TargetRcsType::Git => "git",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetRcsType::Bzr => "BZR",
            TargetRcsType::Git => "GIT",
        }
    }

    pub fn from_arg_name(s: &str) -> Option<Self> {
        match s {
            "bzr" => Some(TargetRcsType::Bzr),
            "git" => Some(TargetRcsType::Git),
            _ => None,
        }
    }
}

impl FromStr for TargetRcsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BZR" => Ok(TargetRcsType::Bzr),
            "GIT" => Ok(TargetRcsType::Git),
            _ => Err(format!("unknown target rcs type: {}", s)),
        }
    }
}

impl std::fmt::Display for TargetRcsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.arg_name())
    }
}

impl SourceDetails {
    /// Parses the argument vector handed to a worker
    pub fn from_arguments(arguments: &[String]) -> Result<Self, ArgumentError> {
        let mut args = arguments.iter();

        let target_id = args.next().ok_or(ArgumentError::Missing("target id"))?;
        let kind = args.next().ok_or(ArgumentError::Missing("import kind"))?;

        let (rcs, target_rcs) = kind
            .split_once(':')
            .ok_or_else(|| ArgumentError::MalformedKind(kind.clone()))?;
        let rcs_type =
            RcsType::from_arg_name(rcs).ok_or_else(|| ArgumentError::UnknownRcs(rcs.to_string()))?;
        let target_rcs_type = TargetRcsType::from_arg_name(target_rcs)
            .ok_or_else(|| ArgumentError::UnknownRcs(target_rcs.to_string()))?;

        let location = if rcs_type.uses_url() {
            let url = args.next().ok_or(ArgumentError::Missing("source url"))?;
            SourceLocation::Url(url.clone())
        } else {
            let root = args.next().ok_or(ArgumentError::Missing("cvs root"))?;
            let module = args.next().ok_or(ArgumentError::Missing("cvs module"))?;
            SourceLocation::Cvs {
                root: root.clone(),
                module: module.clone(),
            }
        };

        let trailing: Vec<String> = args.cloned().collect();
        if !trailing.is_empty() {
            return Err(ArgumentError::Trailing(trailing));
        }

        Ok(Self {
            target_id: target_id.clone(),
            rcs_type,
            target_rcs_type,
            location,
        })
    }

    /// Renders the argument vector for a worker
    pub fn to_arguments(&self) -> Vec<String> {
        let mut args = vec![
            self.target_id.clone(),
            format!(
                "{}:{}",
                self.rcs_type.arg_name(),
                self.target_rcs_type.arg_name()
            ),
        ];
        match &self.location {
            SourceLocation::Url(url) => args.push(url.clone()),
            SourceLocation::Cvs { root, module } => {
                args.push(root.clone());
                args.push(module.clone());
            }
        }
        args
    }

    /// Source URL, for URL-located imports
    pub fn url(&self) -> Option<&str> {
        match &self.location {
            SourceLocation::Url(url) => Some(url),
            SourceLocation::Cvs { .. } => None,
        }
    }
}
