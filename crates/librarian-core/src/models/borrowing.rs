use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    /// Waiting for a librarian to approve
    Pending,
    Active,
    Returned,
    Overdue,
    Rejected,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BorrowingStatus::Pending => write!(f, "Pending Approval"),
            BorrowingStatus::Active => write!(f, "Active"),
            BorrowingStatus::Returned => write!(f, "Returned"),
            BorrowingStatus::Overdue => write!(f, "Overdue"),
            BorrowingStatus::Rejected => write!(f, "Rejected"),
            BorrowingStatus::Other => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Borrowing {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "copyId")]
    pub copy_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "borrowedAt")]
    pub borrowed_at: DateTime<Utc>,
    #[serde(rename = "dueDate")]
    pub due_date: DateTime<Utc>,
    #[serde(rename = "returnedAt", default)]
    pub returned_at: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
}

impl Borrowing {
    /// Still out past the due date at `now`. The backend's status is not
    /// always updated until its nightly sweep.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.returned_at.is_none()
            && matches!(self.status, BorrowingStatus::Active | BorrowingStatus::Overdue)
            && now > self.due_date
    }

    /// Whole days until due; negative when overdue
    pub fn days_until_due(&self, now: DateTime<Utc>) -> i64 {
        (self.due_date - now).num_days()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BorrowRequest<'a> {
    #[serde(rename = "copyId")]
    pub copy_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn loan(status: BorrowingStatus) -> Borrowing {
        let borrowed_at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        Borrowing {
            id: "b1".to_string(),
            copy_id: "c1".to_string(),
            user_id: "u1".to_string(),
            borrowed_at,
            due_date: borrowed_at + Duration::days(14),
            returned_at: None,
            status,
        }
    }

    #[test]
    fn test_parse_borrowing() {
        let json = r#"{"_id":"b1","copyId":"c1","userId":"u1","borrowedAt":"2026-03-01T10:00:00Z","dueDate":"2026-03-15T10:00:00Z","returnedAt":null,"status":"active"}"#;
        let borrowing: Borrowing = serde_json::from_str(json).unwrap();
        assert_eq!(borrowing.status, BorrowingStatus::Active);
        assert!(borrowing.returned_at.is_none());
    }

    #[test]
    fn test_overdue() {
        let active = loan(BorrowingStatus::Active);
        let before_due = active.due_date - Duration::days(1);
        let after_due = active.due_date + Duration::days(2);

        assert!(!active.is_overdue_at(before_due));
        assert!(active.is_overdue_at(after_due));
        assert_eq!(active.days_until_due(before_due), 1);
        assert_eq!(active.days_until_due(after_due), -2);

        // pending loans are never overdue
        assert!(!loan(BorrowingStatus::Pending).is_overdue_at(after_due));
    }
}
