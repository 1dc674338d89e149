mod common;

use axum::http::StatusCode;
use common::TestApp;
use moderation_service::services::Store;
use serde_json::json;

async fn reported_post(app: &TestApp) -> (String, i64, i64) {
    let (_, owner) = app.signup("alice").await;
    let (_, reporter) = app.signup("bob").await;
    let post_id = app.create_post(&owner, "Spam", "public").await;

    let response = app
        .post(
            &format!("/posts/{}/reports", post_id),
            Some(&reporter),
            json!({ "reason": "Looks like spam" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    assert_eq!(response.body["status"], "pending");
    let report_id = response.body["id"].as_i64().unwrap();
    (reporter, post_id, report_id)
}

#[tokio::test]
async fn reporting_a_missing_post_is_404() {
    let app = TestApp::new().await;
    let (_, token) = app.signup("bob").await;
    let response = app
        .post("/posts/999/reports", Some(&token), json!({ "reason": "?" }))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn plain_users_cannot_read_or_moderate_reports() {
    let app = TestApp::new().await;
    let (reporter, _, report_id) = reported_post(&app).await;

    assert_eq!(
        app.get("/reports", Some(&reporter)).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        app.put(
            &format!("/reports/{}/status", report_id),
            Some(&reporter),
            json!({ "status": "resolved" }),
        )
        .await
        .status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.get("/reports", None).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn moderator_lists_and_resolves_reports() {
    let app = TestApp::new().await;
    let (_, _, report_id) = reported_post(&app).await;
    let (moderator_id, moderator) = app.signup("carol").await;
    app.grant_role(moderator_id, "moderator").await;

    let list = app.get("/reports", Some(&moderator)).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body["total"], 1);
    assert_eq!(list.body["data"][0]["id"], report_id);

    let resolved = app
        .put(
            &format!("/reports/{}/status", report_id),
            Some(&moderator),
            json!({ "status": "resolved" }),
        )
        .await;
    assert_eq!(resolved.status, StatusCode::OK);
    assert_eq!(resolved.body["status"], "resolved");

    let logs = app
        .store
        .find_audit_logs_by_record("reports", report_id)
        .await
        .unwrap();
    assert_eq!(logs[0].action, "update_report_status");
    assert_eq!(logs[0].user_id, Some(moderator_id));
    assert_eq!(logs[0].old_values.as_ref().unwrap()["status"], "pending");
    assert_eq!(logs[0].new_values.as_ref().unwrap()["status"], "resolved");
    assert_eq!(logs[1].action, "create_report");
}

#[tokio::test]
async fn unknown_status_is_rejected() {
    let app = TestApp::new().await;
    let (_, _, report_id) = reported_post(&app).await;
    let (moderator_id, moderator) = app.signup("carol").await;
    app.grant_role(moderator_id, "moderator").await;

    let response = app
        .put(
            &format!("/reports/{}/status", report_id),
            Some(&moderator),
            json!({ "status": "escalated" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let missing = app
        .put(
            "/reports/999/status",
            Some(&moderator),
            json!({ "status": "resolved" }),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn permission_lookup_failure_is_500_not_403() {
    let app = TestApp::new().await;
    let (moderator_id, moderator) = app.signup("carol").await;
    app.grant_role(moderator_id, "moderator").await;

    app.store.fail_on("find_user_roles");
    let response = app.get("/reports", Some(&moderator)).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    app.store.recover("find_user_roles");
    let response = app.get("/reports", Some(&moderator)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn failed_audit_surfaces_but_report_is_kept() {
    let app = TestApp::new().await;
    let (_, owner) = app.signup("alice").await;
    let (_, reporter) = app.signup("bob").await;
    let post_id = app.create_post(&owner, "Spam", "public").await;

    app.store.fail_on("insert_audit_log");
    let response = app
        .post(
            &format!("/posts/{}/reports", post_id),
            Some(&reporter),
            json!({ "reason": "Looks like spam" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    app.store.recover("insert_audit_log");

    let (reports, total) = app.store.list_reports(0, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(reports[0].post_id, post_id);
}
