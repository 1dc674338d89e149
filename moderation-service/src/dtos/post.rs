use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,

    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub contact_name: Option<String>,

    #[validate(length(max = 20, message = "Mobile number is too long"))]
    #[serde(default)]
    pub mobile_number: Option<String>,

    pub incident_date: NaiveDate,

    #[serde(default)]
    pub is_anonymous: Option<bool>,

    #[serde(default)]
    pub visibility: Option<String>,

    #[serde(default)]
    pub allow_comments: Option<bool>,
}

/// Partial update. See `PostService::update_post` for how absent and empty
/// fields are merged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(max = 200, message = "Title is too long"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub contact_name: Option<String>,
    #[validate(length(max = 20, message = "Mobile number is too long"))]
    pub mobile_number: Option<String>,
    pub incident_date: Option<NaiveDate>,
    pub is_anonymous: Option<bool>,
    pub visibility: Option<String>,
    pub allow_comments: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReportRequest {
    #[validate(length(min = 1, max = 1000, message = "Reason must be 1-1000 characters"))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateReportStatusRequest {
    #[validate(length(min = 1, message = "Status is required"))]
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PaginationQuery {
    /// `(page, size)` with defaults applied: page >= 1, size in 1..=100.
    pub fn resolve(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, size)
    }
}

/// One page of a listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}
