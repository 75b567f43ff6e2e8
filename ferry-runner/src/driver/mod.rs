//! Import drivers
//!
//! A driver moves history from a foreign repository into the hosted target.
//! The supported (source, target) pairings form a closed set; `driver_for`
//! resolves one into a boxed `ImportDriver`. Adding a pairing means adding a
//! `DriverKind` variant and its arm in `driver_for`.

pub mod process;

use async_trait::async_trait;
use ferry_core::domain::result::ResultStatus;
use ferry_core::domain::source::{RcsType, SourceDetails, SourceLocation, TargetRcsType};
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

use crate::service::LogCapture;
use process::{Step, run_steps};

/// Supported import pairings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// bzr → bzr
    BazaarNative,
    /// bzr-svn → bzr
    BazaarFromSubversion,
    /// cvs → bzr
    BazaarFromCvs,
    /// git → bzr
    GitNative,
    /// git → git
    GitToGit,
}

impl DriverKind {
    pub fn for_pairing(rcs_type: RcsType, target: TargetRcsType) -> Option<Self> {
        match (rcs_type, target) {
            (RcsType::Bzr, TargetRcsType::Bzr) => Some(DriverKind::BazaarNative),
            (RcsType::BzrSvn, TargetRcsType::Bzr) => Some(DriverKind::BazaarFromSubversion),
            (RcsType::Cvs, TargetRcsType::Bzr) => Some(DriverKind::BazaarFromCvs),
            (RcsType::Git, TargetRcsType::Bzr) => Some(DriverKind::GitNative),
            (RcsType::Git, TargetRcsType::Git) => Some(DriverKind::GitToGit),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::BazaarNative => "bazaar-native",
            DriverKind::BazaarFromSubversion => "bazaar-from-subversion",
            DriverKind::BazaarFromCvs => "bazaar-from-cvs",
            DriverKind::GitNative => "git-native",
            DriverKind::GitToGit => "git-to-git",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// No driver exists for this pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedPairing {
    pub rcs_type: RcsType,
    pub target_rcs_type: TargetRcsType,
}

impl fmt::Display for UnsupportedPairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no import driver for {} into {}",
            self.rcs_type.arg_name(),
            self.target_rcs_type.arg_name()
        )
    }
}

impl std::error::Error for UnsupportedPairing {}

/// Runs one import
#[async_trait]
pub trait ImportDriver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Performs the import inside `work_dir`, writing all output to `log`
    async fn run(&self, work_dir: &Path, log: &LogCapture) -> ResultStatus;
}

/// Resolves the driver for an import
pub fn driver_for(
    details: &SourceDetails,
    target_url: &str,
) -> Result<Box<dyn ImportDriver>, UnsupportedPairing> {
    let unsupported = || UnsupportedPairing {
        rcs_type: details.rcs_type,
        target_rcs_type: details.target_rcs_type,
    };

    let kind = DriverKind::for_pairing(details.rcs_type, details.target_rcs_type)
        .ok_or_else(unsupported)?;

    match (kind, &details.location) {
        (DriverKind::GitToGit, SourceLocation::Url(url)) => Ok(Box::new(GitMirror {
            source_url: url.clone(),
            target_url: target_url.to_string(),
        })),
        (DriverKind::GitToGit, SourceLocation::Cvs { .. }) => Err(unsupported()),
        (kind, location) => Ok(Box::new(BazaarImport {
            kind,
            location: location.clone(),
            target_url: target_url.to_string(),
        })),
    }
}

/// bzr errors that mean the source is not a usable branch
const BZR_INVALID: [&str; 4] = [
    "Not a branch",
    "No repository present",
    "Connection error",
    "Too many redirections",
];

/// bzr errors for source URLs bzr refuses to open
const BZR_FORBIDDEN: [&str; 2] = ["Unsupported protocol", "Invalid url"];

/// Git histories the bzr-git plugin cannot represent
const BZR_GIT_UNSUPPORTED: [&str; 2] = ["InvalidEntryName", "SubmodulesRequireSubtrees"];

/// Subversion servers that fail to hand out their full history
const BZR_SVN_BROKEN: [&str; 1] = ["IncompleteRepositoryHistory"];

/// git errors that mean the source is not a usable repository
const GIT_INVALID: [&str; 4] = [
    "Repository not found",
    "does not appear to be a git repository",
    "Could not resolve host",
    "Connection refused",
];

/// git errors for a remote that serves corrupt or incomplete objects
const GIT_BROKEN: [&str; 3] = [
    "did not send all necessary objects",
    "index-pack failed",
    "bad object",
];

fn failing_with(step: Step, needles: &[&'static str], status: ResultStatus) -> Step {
    needles
        .iter()
        .fold(step, |step, needle| step.failing_as(*needle, status))
}

/// Fetches into a local Bazaar branch, then pushes it to the target
///
/// The bzr-svn and bzr-git plugins let `bzr branch` read Subversion and Git
/// URLs; CVS goes through `cvsps-import`.
pub struct BazaarImport {
    kind: DriverKind,
    location: SourceLocation,
    target_url: String,
}

impl BazaarImport {
    pub fn steps(&self, work_dir: &Path) -> Vec<Step> {
        let branch = work_dir.join("branch");

        let fetch = match &self.location {
            SourceLocation::Url(url) => Step::new(
                "bzr",
                [
                    OsStr::new("branch"),
                    OsStr::new("--no-tree"),
                    OsStr::new(url),
                    branch.as_os_str(),
                ],
            ),
            SourceLocation::Cvs { root, module } => Step::new(
                "bzr",
                [
                    OsStr::new("cvsps-import"),
                    OsStr::new(root),
                    OsStr::new(module),
                    branch.as_os_str(),
                ],
            ),
        };
        let mut fetch = failing_with(fetch, &BZR_INVALID, ResultStatus::FailureInvalid);
        fetch = failing_with(fetch, &BZR_FORBIDDEN, ResultStatus::FailureForbidden);
        match self.kind {
            DriverKind::GitNative => {
                fetch = failing_with(
                    fetch,
                    &BZR_GIT_UNSUPPORTED,
                    ResultStatus::FailureUnsupportedFeature,
                );
            }
            DriverKind::BazaarFromSubversion => {
                fetch = failing_with(fetch, &BZR_SVN_BROKEN, ResultStatus::FailureRemoteBroken);
            }
            _ => {}
        }

        let push = Step::new(
            "bzr",
            [
                OsStr::new("push"),
                OsStr::new("--overwrite"),
                OsStr::new("--directory"),
                branch.as_os_str(),
                OsStr::new(&self.target_url),
            ],
        )
        .succeeding_as("No new revisions", ResultStatus::SuccessNochange);

        vec![fetch, push]
    }
}

#[async_trait]
impl ImportDriver for BazaarImport {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    async fn run(&self, work_dir: &Path, log: &LogCapture) -> ResultStatus {
        run_steps(&self.steps(work_dir), work_dir, log).await
    }
}

/// Mirrors a Git repository into a hosted Git repository
pub struct GitMirror {
    source_url: String,
    target_url: String,
}

impl GitMirror {
    pub fn steps(&self, work_dir: &Path) -> Vec<Step> {
        let mirror = work_dir.join("mirror.git");

        let clone = Step::new(
            "git",
            [
                OsStr::new("clone"),
                OsStr::new("--mirror"),
                OsStr::new(&self.source_url),
                mirror.as_os_str(),
            ],
        );
        let clone = failing_with(clone, &GIT_INVALID, ResultStatus::FailureInvalid);
        let clone = failing_with(clone, &GIT_BROKEN, ResultStatus::FailureRemoteBroken);

        let push = Step::new(
            "git",
            [
                OsStr::new("--git-dir"),
                mirror.as_os_str(),
                OsStr::new("push"),
                OsStr::new("--mirror"),
                OsStr::new(&self.target_url),
            ],
        )
        .succeeding_as("Everything up-to-date", ResultStatus::SuccessNochange);

        vec![clone, push]
    }
}

#[async_trait]
impl ImportDriver for GitMirror {
    fn kind(&self) -> DriverKind {
        DriverKind::GitToGit
    }

    async fn run(&self, work_dir: &Path, log: &LogCapture) -> ResultStatus {
        run_steps(&self.steps(work_dir), work_dir, log).await
    }
}
