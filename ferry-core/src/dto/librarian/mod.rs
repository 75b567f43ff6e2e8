//! Log file store DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Worker log uploaded to the librarian
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadLogFile {
    pub filename: String,
    pub content: String,
}

/// Handle to a stored log file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileAlias {
    pub id: Uuid,
    pub url: String,
}

/// Extracts the alias id from a URL of the form `.../librarian/{id}/{filename}`
pub fn alias_id_from_url(url: &str) -> Option<Uuid> {
    let (_, rest) = url.split_once("/librarian/")?;
    let id = rest.split('/').next()?;
    Uuid::parse_str(id).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_id_from_url() {
        let id = Uuid::new_v4();
        let url = format!("http://scheduler:8080/librarian/{}/widget.log", id);
        assert_eq!(alias_id_from_url(&url), Some(id));
    }

    #[test]
    fn test_foreign_urls_have_no_alias() {
        assert_eq!(alias_id_from_url("http://elsewhere/logs/widget.log"), None);
        assert_eq!(alias_id_from_url("http://scheduler/librarian/not-a-uuid/x"), None);
    }
}
