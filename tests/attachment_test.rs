mod common;

use reqwest::multipart::{Form, Part};
use serde_json::Value;

async fn post_with_board(app: &common::TestApp, board_fields: Value) -> i64 {
    let board = common::create_board(app, board_fields).await;
    let post = common::create_post(app, board["id"].as_i64().unwrap(), serde_json::json!({})).await;
    post["id"].as_i64().unwrap()
}

async fn upload(
    app: &common::TestApp,
    post_id: i64,
    files: Vec<(&str, Vec<u8>)>,
) -> (u16, Value) {
    let mut form = Form::new().text("post_id", post_id.to_string());
    for (name, data) in files {
        form = form.part("files", Part::bytes(data).file_name(name.to_string()));
    }
    let resp = app
        .client
        .post(app.url("/admin/upload"))
        .bearer_auth(common::editor_token())
        .multipart(form)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn uploaded_image_is_served_inline_with_its_bytes() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({ "board_type": "gallery" })).await;

    let (status, body) = upload(&app, post_id, vec![("성가대.png", common::TINY_PNG.to_vec())]).await;
    assert_eq!(status, 200, "{}", body);
    let saved = &body["data"]["uploaded"][0];
    assert_eq!(saved["mime_type"], "image/png");
    assert_eq!(saved["file_type"], "image");
    assert_eq!(saved["image_width"], 1);
    assert_eq!(saved["image_height"], 1);
    assert_eq!(saved["file_size"], common::TINY_PNG.len());
    assert_eq!(saved["original_name"], "성가대.png");
    assert_eq!(saved["display_order"], 0);

    let url = format!("/files/{}", saved["id"]);
    let resp = app.client.get(app.url(&url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("inline"));
    assert!(disposition.contains("filename*=UTF-8''"));
    assert_eq!(
        resp.headers()["cross-origin-resource-policy"],
        "cross-origin"
    );
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(bytes.as_ref(), common::TINY_PNG);

    // Each download is counted
    app.client.get(app.url(&url)).send().await.unwrap();
    let resp = app
        .client
        .get(app.url(&format!("/admin/posts/{}/attachments", post_id)))
        .bearer_auth(common::editor_token())
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["download_count"], 2);

    let resp = app
        .client
        .get(app.url(&format!("/posts/{}/images", post_id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn documents_are_downloads() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;

    let (status, body) = upload(&app, post_id, vec![("bulletin.pdf", common::MINIMAL_PDF.to_vec())]).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["uploaded"][0]["file_type"], "document");
    assert!(body["data"]["uploaded"][0]["image_width"].is_null());

    let resp = app
        .client
        .get(app.url(&format!("/files/{}", body["data"]["uploaded"][0]["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["content-type"], "application/pdf");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"bulletin.pdf\"; filename*=UTF-8''bulletin.pdf"
    );
}

#[tokio::test]
async fn oversized_file_is_rejected() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;

    let big = "a".repeat(15 * 1024 * 1024).into_bytes();
    let (status, body) = upload(&app, post_id, vec![("huge.txt", big)]).await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("maximum size"));

    // Nothing was written
    let mut entries = std::fs::read_dir(app.upload_root()).unwrap();
    assert!(entries.next().is_none());
}

#[tokio::test]
async fn smaller_limit_is_honoured() {
    let app = common::spawn_app_with(|c| c.with_max_file_size(16)).await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;

    let (status, _) = upload(&app, post_id, vec![("a.txt", b"0123456789abcdef".to_vec())]).await;
    assert_eq!(status, 200);
    let (status, _) = upload(&app, post_id, vec![("b.txt", b"0123456789abcdefg".to_vec())]).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn html_disguised_as_jpeg_is_rejected() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;

    let (status, body) = upload(
        &app,
        post_id,
        vec![("photo.jpg", b"<!DOCTYPE html><html><script>alert(1)</script></html>".to_vec())],
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("text/html"));
}

#[tokio::test]
async fn batch_keeps_the_good_files() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;

    let (status, body) = upload(
        &app,
        post_id,
        vec![
            ("good.png", common::TINY_PNG.to_vec()),
            ("evil.jpg", b"<html><body>x</body></html>".to_vec()),
            ("notes.txt", b"second service at 11".to_vec()),
        ],
    )
    .await;
    assert_eq!(status, 200);
    let uploaded = body["data"]["uploaded"].as_array().unwrap();
    let failed = body["data"]["failed"].as_array().unwrap();
    assert_eq!(uploaded.len(), 2);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["original_name"], "evil.jpg");
    assert_eq!(uploaded[0]["display_order"], 0);
    assert_eq!(uploaded[1]["display_order"], 1);
}

#[tokio::test]
async fn board_without_attachments_refuses_uploads() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({ "allow_attachment": false })).await;

    let (status, _) = upload(&app, post_id, vec![("a.png", common::TINY_PNG.to_vec())]).await;
    assert_eq!(status, 400);

    let (status, _) = upload(&app, 98765, vec![("a.png", common::TINY_PNG.to_vec())]).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn upload_without_files_is_rejected() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;

    let (status, _) = upload(&app, post_id, Vec::new()).await;
    assert_eq!(status, 400);

    let resp = app
        .client
        .post(app.url("/admin/upload"))
        .bearer_auth(common::viewer_token())
        .multipart(Form::new().text("post_id", post_id.to_string()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn delete_survives_a_missing_file() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;

    let (_, body) = upload(&app, post_id, vec![("memo.txt", b"hello".to_vec())]).await;
    let id = body["data"]["uploaded"][0]["id"].as_i64().unwrap();

    let attachment = church_cms::services::attachment::AttachmentService::new(app.db.clone(), &app.upload)
        .get_by_id(id as i32)
        .await
        .unwrap();
    std::fs::remove_file(app.upload_root().join(&attachment.file_path)).unwrap();

    let resp = app
        .client
        .get(app.url(&format!("/files/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = app
        .client
        .delete(app.url(&format!("/admin/attachments/{}", id)))
        .bearer_auth(common::editor_token())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app
        .client
        .delete(app.url(&format!("/admin/attachments/{}", id)))
        .bearer_auth(common::editor_token())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn path_links_stay_inside_the_upload_root() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;

    let (_, body) = upload(&app, post_id, vec![("a.png", common::TINY_PNG.to_vec())]).await;
    let id = body["data"]["uploaded"][0]["id"].as_i64().unwrap();
    let attachment = church_cms::services::attachment::AttachmentService::new(app.db.clone(), &app.upload)
        .get_by_id(id as i32)
        .await
        .unwrap();

    let resp = app
        .client
        .get(app.url(&format!("/files/path/{}", attachment.file_path)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");

    // Encoded separators keep the client from normalising the dots away
    let resp = app
        .client
        .get(app.url("/files/path/..%2F..%2Fetc%2Fpasswd"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Traversal segments are dropped, not followed
    let resp = app
        .client
        .get(app.url(&format!(
            "/files/path/..%2F..%2F{}",
            attachment.file_path.replace('/', "%2F")
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn thumbnails_when_enabled() {
    let app = common::spawn_app_with(|c| c.with_thumbnails(true)).await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;

    let (status, body) = upload(&app, post_id, vec![("a.png", common::TINY_PNG.to_vec())]).await;
    assert_eq!(status, 200);
    let id = body["data"]["uploaded"][0]["id"].as_i64().unwrap();

    let service = church_cms::services::attachment::AttachmentService::new(app.db.clone(), &app.upload);
    let attachment = service.get_by_id(id as i32).await.unwrap();
    let thumb = church_cms::services::storage::thumbnail_path(&attachment.file_path);
    assert!(app.upload_root().join(&thumb).exists());

    service.delete(attachment.id).await.unwrap();
    assert!(!app.upload_root().join(&thumb).exists());
    assert!(!app.upload_root().join(&attachment.file_path).exists());
}

#[tokio::test]
async fn display_order_can_be_changed() {
    let app = common::spawn_app().await;
    let post_id = post_with_board(&app, serde_json::json!({})).await;
    let (_, body) = upload(
        &app,
        post_id,
        vec![("1.txt", b"first".to_vec()), ("2.txt", b"second".to_vec())],
    )
    .await;
    let first = body["data"]["uploaded"][0]["id"].clone();

    let resp = app
        .client
        .put(app.url(&format!("/admin/attachments/{}/order", first)))
        .bearer_auth(common::editor_token())
        .json(&serde_json::json!({ "display_order": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app
        .client
        .get(app.url(&format!("/admin/posts/{}/attachments", post_id)))
        .bearer_auth(common::editor_token())
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][1]["id"], first);
}

#[tokio::test]
async fn files_follow_their_board_and_post() {
    let app = common::spawn_app().await;
    let restricted = post_with_board(&app, serde_json::json!({ "require_auth": true })).await;
    let hidden = post_with_board(&app, serde_json::json!({ "is_visible": false })).await;
    let draft_board = common::create_board(&app, serde_json::json!({})).await;
    let draft = common::create_post(
        &app,
        draft_board["id"].as_i64().unwrap(),
        serde_json::json!({ "is_published": false }),
    )
    .await["id"]
        .as_i64()
        .unwrap();

    let mut ids = Vec::new();
    for post_id in [restricted, hidden, draft] {
        let (status, body) = upload(&app, post_id, vec![("a.png", common::TINY_PNG.to_vec())]).await;
        assert_eq!(status, 200);
        ids.push(body["data"]["uploaded"][0]["id"].as_i64().unwrap());
    }
    let fetch = |id: i64, token: Option<String>| {
        let mut req = app.client.get(app.url(&format!("/files/{}", id)));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send()
    };

    assert_eq!(fetch(ids[0], None).await.unwrap().status(), 401);
    assert_eq!(fetch(ids[0], Some(common::viewer_token())).await.unwrap().status(), 200);
    assert_eq!(fetch(ids[1], Some(common::viewer_token())).await.unwrap().status(), 404);
    assert_eq!(fetch(ids[2], None).await.unwrap().status(), 404);

    // Editors preview anything
    for id in &ids {
        assert_eq!(fetch(*id, Some(common::editor_token())).await.unwrap().status(), 200);
    }

    // The legacy path link of a stored attachment gets the same treatment
    let attachment = church_cms::services::attachment::AttachmentService::new(app.db.clone(), &app.upload)
        .get_by_id(ids[0] as i32)
        .await
        .unwrap();
    let resp = app
        .client
        .get(app.url(&format!("/files/path/{}", attachment.file_path)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}
