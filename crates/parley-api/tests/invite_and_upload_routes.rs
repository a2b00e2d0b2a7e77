use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use parley_core::AppState;
use serde_json::Value;
use tower::ServiceExt;

async fn test_app(admin_token: Option<&str>) -> (Router, tempfile::TempDir) {
    let db = parley_db::create_pool(":memory:").await.unwrap();
    parley_db::run_migrations(&db).await.unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        db,
        data_dir.path().to_path_buf(),
        admin_token.map(str::to_string),
        admin_token.is_none(),
        false,
        "ws://localhost:8080/ws".to_string(),
    );
    let app = parley_api::build_router().with_state(state);
    (app, data_dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn minting_an_invite_without_admin_token_is_rejected() {
    let (app, _dir) = test_app(Some("secret")).await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/servers/1/invites")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mint_lookup_redeem_round_trip() {
    let db = parley_db::create_pool(":memory:").await.unwrap();
    parley_db::run_migrations(&db).await.unwrap();
    parley_db::servers::create_server(&db, 1, "Test", None).await.unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        db,
        data_dir.path().to_path_buf(),
        Some("secret".into()),
        false,
        false,
        "ws://localhost:8080/ws".to_string(),
    );
    let app = parley_api::build_router().with_state(state);

    let mint_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/servers/1/invites")
                .header("content-type", "application/json")
                .header("x-admin-token", "secret")
                .body(Body::from(r#"{"max_uses":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(mint_response.status(), StatusCode::CREATED);
    let minted = body_json(mint_response).await;
    let token = minted["token"].as_str().unwrap().to_string();

    let lookup_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/api/invites/{token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(lookup_response.status(), StatusCode::OK);

    let first_redeem = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/invites/redeem")
                .header("content-type", "application/json")
                .body(Body::from(format!(r#"{{"token":"{token}"}}"#)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first_redeem.status(), StatusCode::OK);
    let redeemed = body_json(first_redeem).await;
    assert!(redeemed["credential"].as_str().unwrap().len() > 0);

    let second_redeem = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/invites/redeem")
                .header("content-type", "application/json")
                .body(Body::from(format!(r#"{{"token":"{token}"}}"#)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        second_redeem.status(),
        StatusCode::BAD_REQUEST,
        "a second redemption past max_uses=1 must fail"
    );
}

#[tokio::test]
async fn avatar_upload_rejects_disallowed_mime_and_accepts_png() {
    let db = parley_db::create_pool(":memory:").await.unwrap();
    parley_db::run_migrations(&db).await.unwrap();
    parley_db::servers::create_server(&db, 1, "Test", None).await.unwrap();
    parley_db::users::create_user(&db, 7, "alice", Some("0xA")).await.unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        db,
        data_dir.path().to_path_buf(),
        None,
        true,
        false,
        "ws://localhost:8080/ws".to_string(),
    );
    let app = parley_api::build_router().with_state(state);

    let boundary = "X-BOUNDARY-X";
    let bad_body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.svg\"\r\nContent-Type: image/svg+xml\r\n\r\n<svg/>\r\n--{boundary}--\r\n"
    );
    let rejected = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users/7/avatar")
                .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(bad_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let good_body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n\x89PNG\r\n--{boundary}--\r\n"
    );
    let accepted = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users/7/avatar")
                .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(good_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
}
