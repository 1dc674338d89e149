//! Post and report moderation.
//!
//! Every successful mutation writes an audit entry; updates additionally
//! write a history snapshot first. The steps are ordered but not
//! transactional, so a failure after the primary write leaves it committed
//! and the caller sees an error.

use std::sync::Arc;

use serde_json::json;

use super::{AuditService, HistoryService, ServiceError, Store};
use crate::config::BoolMergeMode;
use crate::dtos::post::{
    CreatePostRequest, CreateReportRequest, Page, PaginationQuery, UpdatePostRequest,
    UpdateReportStatusRequest,
};
use crate::models::post::POST_STATUS_ACTIVE;
use crate::models::{
    AuditAction, NewPost, NewReport, Post, PostHistory, Report, ReportStatus, Snapshot,
    Visibility,
};

pub const POSTS_TABLE: &str = "posts";
pub const REPORTS_TABLE: &str = "reports";

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn Store>,
    audit: AuditService,
    history: HistoryService,
    bool_merge: BoolMergeMode,
}

fn parse_visibility(value: &str) -> Result<Visibility, ServiceError> {
    value.parse().map_err(ServiceError::Validation)
}

/// Present and non-empty.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Apply `req` on top of `post`.
///
/// Strings overwrite only when present and non-empty, so a field cannot be
/// cleared through an update. `incident_date` overwrites when present.
/// Omitted booleans reset to `false` in legacy mode and keep the stored
/// value in explicit mode.
pub fn merge_update(
    post: &Post,
    req: &UpdatePostRequest,
    mode: BoolMergeMode,
) -> Result<Post, ServiceError> {
    let mut merged = post.clone();

    if let Some(title) = non_empty(&req.title) {
        merged.title = title.to_string();
    }
    if let Some(description) = non_empty(&req.description) {
        merged.description = description.to_string();
    }
    if let Some(address) = non_empty(&req.address) {
        merged.address = address.to_string();
    }
    if let Some(contact_name) = non_empty(&req.contact_name) {
        merged.contact_name = contact_name.to_string();
    }
    if let Some(mobile_number) = non_empty(&req.mobile_number) {
        merged.mobile_number = mobile_number.to_string();
    }
    if let Some(visibility) = non_empty(&req.visibility) {
        merged.visibility = parse_visibility(visibility)?.as_str().to_string();
    }
    if let Some(incident_date) = req.incident_date {
        merged.incident_date = incident_date;
    }

    let merge_bool = |incoming: Option<bool>, stored: bool| match (incoming, mode) {
        (Some(value), _) => value,
        (None, BoolMergeMode::Legacy) => false,
        (None, BoolMergeMode::Explicit) => stored,
    };
    merged.is_anonymous = merge_bool(req.is_anonymous, post.is_anonymous);
    merged.allow_comments = merge_bool(req.allow_comments, post.allow_comments);

    Ok(merged)
}

fn report_snapshot(report: &Report) -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot.insert("post_id".to_string(), json!(report.post_id));
    snapshot.insert("reporter_id".to_string(), json!(report.reporter_id));
    snapshot.insert("reason".to_string(), json!(report.reason));
    snapshot.insert("status".to_string(), json!(report.status));
    snapshot
}

fn status_snapshot(status: &str) -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot.insert("status".to_string(), json!(status));
    snapshot
}

impl PostService {
    pub fn new(
        store: Arc<dyn Store>,
        audit: AuditService,
        history: HistoryService,
        bool_merge: BoolMergeMode,
    ) -> Self {
        Self {
            store,
            audit,
            history,
            bool_merge,
        }
    }

    async fn require_post(&self, post_id: i64) -> Result<Post, ServiceError> {
        self.store
            .find_post_by_id(post_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Post".to_string()))
    }

    async fn require_owned_post(&self, user_id: i64, post_id: i64) -> Result<Post, ServiceError> {
        let post = self.require_post(post_id).await?;
        if post.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "only the owner can modify this post".to_string(),
            ));
        }
        Ok(post)
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn create_post(
        &self,
        user_id: i64,
        req: CreatePostRequest,
    ) -> Result<Post, ServiceError> {
        let visibility = match non_empty(&req.visibility) {
            Some(v) => parse_visibility(v)?,
            None => Visibility::Public,
        };

        let post = self
            .store
            .insert_post(NewPost {
                user_id,
                title: req.title,
                description: req.description,
                address: req.address.unwrap_or_default(),
                contact_name: req.contact_name.unwrap_or_default(),
                mobile_number: req.mobile_number.unwrap_or_default(),
                incident_date: req.incident_date,
                status: POST_STATUS_ACTIVE.to_string(),
                is_anonymous: req.is_anonymous.unwrap_or(false),
                visibility: visibility.as_str().to_string(),
                allow_comments: req.allow_comments.unwrap_or(true),
            })
            .await?;

        self.audit
            .record(
                Some(user_id),
                AuditAction::Create.as_str(),
                POSTS_TABLE,
                post.id,
                None,
                Some(post.audit_snapshot()),
            )
            .await?;

        tracing::info!(post_id = post.id, "Post created");
        Ok(post)
    }

    /// Private posts are only visible to their owner; anyone else gets
    /// `NotFound`.
    pub async fn get_post(&self, post_id: i64, viewer: Option<i64>) -> Result<Post, ServiceError> {
        let post = self.require_post(post_id).await?;
        if !post.is_visible_to(viewer) {
            return Err(ServiceError::NotFound("Post".to_string()));
        }
        Ok(post)
    }

    pub async fn list_posts(
        &self,
        viewer: Option<i64>,
        query: PaginationQuery,
    ) -> Result<Page<Post>, ServiceError> {
        let (page, size) = query.resolve();
        let (data, total) = self
            .store
            .list_posts(viewer, (page - 1) * size, size)
            .await?;
        Ok(Page {
            data,
            total,
            page,
            size,
        })
    }

    /// Snapshot, apply, audit. The audit entry's old values come from the
    /// stored post before the edit and the new values from the stored post
    /// after it.
    #[tracing::instrument(skip(self, req))]
    pub async fn update_post(
        &self,
        user_id: i64,
        post_id: i64,
        req: UpdatePostRequest,
    ) -> Result<Post, ServiceError> {
        let current = self.require_owned_post(user_id, post_id).await?;
        let merged = merge_update(&current, &req, self.bool_merge)?;

        self.history.snapshot_before_update(&current).await?;
        let updated = self.store.update_post(&merged).await?;

        self.audit
            .record(
                Some(user_id),
                AuditAction::Update.as_str(),
                POSTS_TABLE,
                post_id,
                Some(current.audit_snapshot()),
                Some(updated.audit_snapshot()),
            )
            .await?;

        tracing::info!(post_id, "Post updated");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_post(&self, user_id: i64, post_id: i64) -> Result<(), ServiceError> {
        let current = self.require_owned_post(user_id, post_id).await?;

        if self.store.delete_post(post_id).await? == 0 {
            return Err(ServiceError::NotFound("Post".to_string()));
        }

        self.audit
            .record(
                Some(user_id),
                AuditAction::Delete.as_str(),
                POSTS_TABLE,
                post_id,
                Some(current.audit_snapshot()),
                None,
            )
            .await?;

        tracing::info!(post_id, "Post deleted");
        Ok(())
    }

    /// History of a post, newest first. Owner only.
    pub async fn get_post_history(
        &self,
        user_id: i64,
        post_id: i64,
    ) -> Result<Vec<PostHistory>, ServiceError> {
        self.require_owned_post(user_id, post_id).await?;
        self.history.get_history(post_id).await
    }

    // ==================== Reports ====================

    #[tracing::instrument(skip(self, req))]
    pub async fn create_report(
        &self,
        reporter_id: i64,
        post_id: i64,
        req: CreateReportRequest,
    ) -> Result<Report, ServiceError> {
        self.require_post(post_id).await?;

        let report = self
            .store
            .insert_report(NewReport {
                post_id,
                reporter_id,
                reason: req.reason,
                status: ReportStatus::Pending.as_str().to_string(),
            })
            .await?;

        self.audit
            .record(
                Some(reporter_id),
                AuditAction::CreateReport.as_str(),
                REPORTS_TABLE,
                report.id,
                None,
                Some(report_snapshot(&report)),
            )
            .await?;

        tracing::info!(report_id = report.id, post_id, "Report created");
        Ok(report)
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn update_report_status(
        &self,
        actor: i64,
        report_id: i64,
        req: UpdateReportStatusRequest,
    ) -> Result<Report, ServiceError> {
        let status: ReportStatus = req.status.parse().map_err(ServiceError::Validation)?;

        let current = self
            .store
            .find_report_by_id(report_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Report".to_string()))?;

        let updated = self
            .store
            .update_report_status(report_id, status.as_str())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Report".to_string()))?;

        self.audit
            .record(
                Some(actor),
                AuditAction::UpdateReportStatus.as_str(),
                REPORTS_TABLE,
                report_id,
                Some(status_snapshot(&current.status)),
                Some(status_snapshot(&updated.status)),
            )
            .await?;

        tracing::info!(report_id, status = status.as_str(), "Report status updated");
        Ok(updated)
    }

    pub async fn list_reports(&self, query: PaginationQuery) -> Result<Page<Report>, ServiceError> {
        let (page, size) = query.resolve();
        let (data, total) = self.store.list_reports((page - 1) * size, size).await?;
        Ok(Page {
            data,
            total,
            page,
            size,
        })
    }
}
