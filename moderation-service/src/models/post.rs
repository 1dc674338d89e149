//! Post, post history and report models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;

use super::Snapshot;

pub const POST_STATUS_ACTIVE: &str = "active";

/// Who can see a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            _ => Err(format!("visibility must be one of: public, private (got '{}')", s)),
        }
    }
}

/// Moderation state of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "resolved" => Ok(ReportStatus::Resolved),
            "rejected" => Ok(ReportStatus::Rejected),
            _ => Err(format!("Invalid report status: {}", s)),
        }
    }
}

/// Incident post, the primary mutable entity.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub address: String,
    pub contact_name: String,
    pub mobile_number: String,
    pub incident_date: NaiveDate,
    pub status: String,
    pub is_anonymous: bool,
    pub visibility: String,
    pub allow_comments: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Business fields as recorded in audit entries.
    pub fn audit_snapshot(&self) -> Snapshot {
        let value = json!({
            "title": self.title,
            "description": self.description,
            "address": self.address,
            "contact_name": self.contact_name,
            "mobile_number": self.mobile_number,
            "incident_date": self.incident_date.format("%Y-%m-%d").to_string(),
            "is_anonymous": self.is_anonymous,
            "visibility": self.visibility,
            "allow_comments": self.allow_comments,
            "status": self.status,
        });
        match value {
            serde_json::Value::Object(map) => map,
            _ => Snapshot::new(),
        }
    }

    pub fn is_visible_to(&self, viewer: Option<i64>) -> bool {
        self.visibility == Visibility::Public.as_str() || viewer == Some(self.user_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub address: String,
    pub contact_name: String,
    pub mobile_number: String,
    pub incident_date: NaiveDate,
    pub status: String,
    pub is_anonymous: bool,
    pub visibility: String,
    pub allow_comments: bool,
}

/// Full-row copy of a post taken right before an update.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PostHistory {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub address: String,
    pub contact_name: String,
    pub mobile_number: String,
    pub incident_date: NaiveDate,
    pub status: String,
    pub is_anonymous: bool,
    pub visibility: String,
    pub allow_comments: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPostHistory {
    pub post_id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub address: String,
    pub contact_name: String,
    pub mobile_number: String,
    pub incident_date: NaiveDate,
    pub status: String,
    pub is_anonymous: bool,
    pub visibility: String,
    pub allow_comments: bool,
    pub created_at: DateTime<Utc>,
}

impl NewPostHistory {
    pub fn capture(post: &Post, at: DateTime<Utc>) -> Self {
        Self {
            post_id: post.id,
            user_id: post.user_id,
            title: post.title.clone(),
            description: post.description.clone(),
            address: post.address.clone(),
            contact_name: post.contact_name.clone(),
            mobile_number: post.mobile_number.clone(),
            incident_date: post.incident_date,
            status: post.status.clone(),
            is_anonymous: post.is_anonymous,
            visibility: post.visibility.clone(),
            allow_comments: post.allow_comments,
            created_at: at,
        }
    }
}

/// A user's report against a post.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Report {
    pub id: i64,
    pub post_id: i64,
    pub reporter_id: i64,
    pub reason: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub post_id: i64,
    pub reporter_id: i64,
    pub reason: String,
    pub status: String,
}
