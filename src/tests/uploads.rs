use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use chrono::{Duration, Utc};

use super::support::{form, test_app};
use crate::{
    errors::ErrorResponse, routes::info::InfoResponse, upload::UploadResponse,
    utilities::LINK_TOKEN_LEN,
};

const PNG_HEADER: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

#[tokio::test]
async fn single_upload() {
    let app = test_app().await;
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"hello".to_vec())
            .file_name("greeting.txt")
            .mime_type("text/plain"),
    );

    let response = app.server.post("/file/upload").multipart(form).await;
    response.assert_status(StatusCode::CREATED);
    let upload = response.json::<UploadResponse>();

    assert_eq!(upload.token.len(), LINK_TOKEN_LEN);
    assert_eq!(
        upload.share_link,
        format!("http://localhost:8080/download/{}", upload.token)
    );
    assert_eq!(
        upload.download_url,
        format!("http://localhost:8080/file/{}/download", upload.token)
    );
    assert_eq!(upload.total_files, 1);
    assert_eq!(upload.files[0].original_name, "greeting.txt");
    assert_eq!(upload.files[0].mime_type, "text/plain");
    assert!(!upload.has_password);
    assert!(!upload.one_time_view);

    let expires_at = upload.expires_at.unwrap();
    let expected = Utc::now() + Duration::days(365);
    assert!((expected - expires_at).num_seconds().abs() < 60);

    let records = app.ctx.records.find_by_token(&upload.token).await.unwrap();
    assert!(app.ctx.blobs.exists(&records[0].stored_name).await.unwrap());
    assert_ne!(records[0].stored_name, "greeting.txt");
    assert!(records[0].stored_name.ends_with(".txt"));
}

#[tokio::test]
async fn single_endpoint_keeps_the_first_file() {
    let app = test_app().await;
    let form = MultipartForm::new()
        .add_part("file", Part::bytes(b"one".to_vec()).file_name("one.txt"))
        .add_part("file", Part::bytes(b"two".to_vec()).file_name("two.txt"));

    let response = app.server.post("/file/upload").multipart(form).await;
    response.assert_status(StatusCode::CREATED);
    let upload = response.json::<UploadResponse>();
    assert_eq!(upload.total_files, 1);
    assert_eq!(upload.files[0].original_name, "one.txt");
}

#[tokio::test]
async fn batch_upload_shares_one_policy() {
    let app = test_app().await;
    let upload = app
        .upload(
            &[("a.txt", b"aa"), ("b.txt", b"bbb")],
            &[("password", "pw"), ("one_time_view", "on")],
        )
        .await;

    assert_eq!(upload.total_files, 2);
    assert_eq!(upload.total_size, 5);

    let records = app.ctx.records.find_by_token(&upload.token).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].original_name, "a.txt");
    assert_eq!(records[1].original_name, "b.txt");
    for record in &records {
        assert!(record.one_time_view);
        assert!(record.password_hash.as_deref().is_some_and(|hash| hash != "pw"));
        assert_eq!(record.expires_at, records[0].expires_at);
    }
}

#[tokio::test]
async fn upload_without_files_is_rejected() {
    let app = test_app().await;
    let response = app
        .server
        .post("/file/upload-batch")
        .multipart(form(&[], &[("password", "pw")]))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<ErrorResponse>().error_code, "empty-upload");
}

#[tokio::test]
async fn custom_links() {
    let app = test_app().await;

    let first = app
        .upload(&[("a.txt", b"a")], &[("custom_link", "my-holiday_pics")])
        .await;
    assert_eq!(first.token, "my-holiday_pics");

    let second = app
        .upload(&[("b.txt", b"b")], &[("custom_link", "my-holiday_pics")])
        .await;
    assert_ne!(second.token, "my-holiday_pics");
    assert_eq!(second.token.len(), LINK_TOKEN_LEN);

    let invalid = app
        .server
        .post("/file/upload-batch")
        .multipart(form(&[("c.txt", b"c")], &[("custom_link", "no spaces/allowed")]))
        .await;
    invalid.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(invalid.json::<ErrorResponse>().error_code, "validation");
}

#[tokio::test]
async fn rejected_upload_leaves_no_blobs() {
    let app = test_app().await;
    let response = app
        .server
        .post("/file/upload-batch")
        .multipart(form(&[("c.txt", b"c")], &[("expires_at", "whenever")]))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let mut entries = tokio::fs::read_dir(&app.ctx.cfg.general.storage_dir).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn sniffs_mime_when_not_declared() {
    let app = test_app().await;
    let upload = app.upload(&[("picture", PNG_HEADER)], &[]).await;
    assert_eq!(upload.files[0].mime_type, "image/png");

    let unknown = app.upload(&[("blob", b"\x00\x01\x02")], &[]).await;
    assert_eq!(unknown.files[0].mime_type, "application/octet-stream");
}

#[tokio::test]
async fn new_upload_replaces_cached_not_found() {
    let app = test_app().await;

    app.server
        .get("/file/fresh-link/status")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.upload(&[("a.txt", b"a")], &[("custom_link", "fresh-link")])
        .await;

    let info = app.server.get("/file/fresh-link").await;
    info.assert_status_ok();
    assert_eq!(info.json::<InfoResponse>().total_files, 1);
}
