//! Argument parsers shared by the command modules
//!
//! Version control systems are accepted in their worker-argument spelling
//! (`bzr-svn`) or their API spelling (`BZR_SVN`).

use ferry_core::domain::source::{RcsType, TargetRcsType};

pub fn parse_rcs_type(input: &str) -> Result<RcsType, String> {
    RcsType::from_arg_name(&input.to_ascii_lowercase())
        .or_else(|| input.to_ascii_uppercase().parse().ok())
        .ok_or_else(|| {
            format!(
                "unknown source type '{}' (expected bzr, bzr-svn, cvs or git)",
                input
            )
        })
}

pub fn parse_target_rcs_type(input: &str) -> Result<TargetRcsType, String> {
    TargetRcsType::from_arg_name(&input.to_ascii_lowercase())
        .ok_or_else(|| format!("unknown target type '{}' (expected bzr or git)", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rcs_type_spellings() {
        assert_eq!(parse_rcs_type("bzr-svn"), Ok(RcsType::BzrSvn));
        assert_eq!(parse_rcs_type("BZR_SVN"), Ok(RcsType::BzrSvn));
        assert_eq!(parse_rcs_type("Git"), Ok(RcsType::Git));
        assert!(parse_rcs_type("hg").is_err());
    }

    #[test]
    fn test_target_rcs_type() {
        assert_eq!(parse_target_rcs_type("git"), Ok(TargetRcsType::Git));
        assert_eq!(parse_target_rcs_type("BZR"), Ok(TargetRcsType::Bzr));
        assert!(parse_target_rcs_type("cvs").is_err());
    }
}
