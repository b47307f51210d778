//! Catalog models: libraries, titles and the physical copies of a title.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Library {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Title {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    #[serde(rename = "publishedYear")]
    pub published_year: Option<i32>,
    pub genre: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "totalCopies")]
    pub total_copies: Option<u32>,
    #[serde(rename = "availableCopies")]
    pub available_copies: Option<u32>,
}

impl Title {
    /// "available/total", or "-" when the backend sent no counts
    pub fn availability_display(&self) -> String {
        match (self.available_copies, self.total_copies) {
            (Some(available), Some(total)) => format!("{}/{}", available, total),
            (Some(available), None) => available.to_string(),
            _ => "-".to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available_copies.map(|n| n > 0).unwrap_or(false)
    }
}

/// Body for creating a title.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewTitle {
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "publishedYear", skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial update; only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TitleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "publishedYear", skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Available,
    Borrowed,
    Reserved,
    Maintenance,
    Lost,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyStatus::Available => write!(f, "Available"),
            CopyStatus::Borrowed => write!(f, "Borrowed"),
            CopyStatus::Reserved => write!(f, "Reserved"),
            CopyStatus::Maintenance => write!(f, "In Maintenance"),
            CopyStatus::Lost => write!(f, "Lost"),
            CopyStatus::Other => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct BookCopy {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "titleId")]
    pub title_id: String,
    #[serde(rename = "libraryId")]
    pub library_id: String,
    pub barcode: Option<String>,
    pub status: CopyStatus,
    pub condition: Option<String>,
}
