mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use stoicpath::{
    users::directory::UserDirectory, verification::VerificationCodeStore,
};

use common::{FakeGoogle, TestApp};

#[tokio::test]
async fn health_is_wrapped_in_envelope() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn register_then_login_needs_verification() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "first_name": "Séneca",
                "last_name": "Joven",
                "email": "Seneca@Example.com",
                "password": "tranquilitas"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["user"]["email"], "seneca@example.com");
    assert_eq!(body["data"]["user"]["email_verified"], false);
    assert!(body["data"]["user"].get("password_hash").is_none());
    assert!(body["data"]["verification_token"].is_string());

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "seneca@example.com", "password": "tranquilitas"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn verify_with_code_then_login() {
    let app = TestApp::new();
    let (_, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "first_name": "Epicteto",
                "last_name": "Hierapolis",
                "email": "epicteto@example.com",
                "password": "dichotomy-of-control"
            })),
        )
        .await;
    let user_id = body["data"]["user"]["id"].as_str().unwrap().to_string();
    let code = app
        .store
        .create_code(user_id.parse().unwrap())
        .await
        .unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/verify-email/code",
            None,
            Some(json!({"user_id": user_id, "code": code})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // second attempt is still a success
    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/verify-email/code",
            None,
            Some(json!({"user_id": user_id, "code": code})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Email was already verified");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "epicteto@example.com", "password": "dichotomy-of-control"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap();
    let claims = app.state.jwt.verify(token).unwrap();
    assert_eq!(claims.sub.to_string(), user_id);
    assert_eq!(body["data"]["subscription"]["status"], "inactive");
}

#[tokio::test]
async fn bad_credentials_look_identical() {
    let app = TestApp::new();
    app.verified_user("known@example.com").await;

    let (s1, b1) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "known@example.com", "password": "wrong-password"})),
        )
        .await;
    let (s2, b2) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "unknown@example.com", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s1, s2);
    assert_eq!(b1, b2);
}

#[tokio::test]
async fn login_validation_errors_are_bad_request() {
    let app = TestApp::new();
    let (status, body) = app
        .send(Method::POST, "/api/v1/auth/login", None, Some(json!({"email": "x@example.com"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "no-at-sign", "password": "whatever-pass"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_json_bodies_are_validation_errors() {
    let app = TestApp::new();
    let (status, body) = app
        .send_raw(Method::POST, "/api/v1/auth/login", None, "application/json", "{not json")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Malformed JSON body");

    let (status, body) = app
        .send_raw(Method::POST, "/api/v1/auth/login", None, "text/plain", "email=x")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Expected a JSON body");
}

#[tokio::test]
async fn register_rejects_verified_email() {
    let app = TestApp::new();
    app.verified_user("taken@example.com").await;
    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "first_name": "Otro",
                "last_name": "Usuario",
                "email": "taken@example.com",
                "password": "long-enough-pass"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn google_login_is_idempotent() {
    let google = FakeGoogle::default().with("tok-1", "g-100", "zeno@example.com", "Zenón Citio");
    let app = TestApp::with_google(google);

    let (status, first) = app
        .send(Method::POST, "/api/v1/auth/google/token", None, Some(json!({"id_token": "tok-1"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["is_new_user"], true);
    assert_eq!(first["data"]["user"]["first_name"], "Zenón");
    assert_eq!(first["data"]["user"]["auth_provider"], "google");

    let (_, second) = app
        .send(Method::POST, "/api/v1/auth/google/token", None, Some(json!({"id_token": "tok-1"})))
        .await;
    assert_eq!(second["data"]["is_new_user"], false);
    assert_eq!(second["data"]["user"]["id"], first["data"]["user"]["id"]);
    assert_eq!(app.store.user_count().await, 1);

    let (status, _) = app
        .send(Method::POST, "/api/v1/auth/google/token", None, Some(json!({"id_token": "forged"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn google_login_links_local_account() {
    let google = FakeGoogle::default().with("tok-2", "g-200", "crisipo@example.com", "Crisipo Solos");
    let app = TestApp::with_google(google);
    let local = app.verified_user("crisipo@example.com").await;

    let (status, body) = app
        .send(Method::POST, "/api/v1/auth/google/token", None, Some(json!({"id_token": "tok-2"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_new_user"], false);
    assert_eq!(body["data"]["user"]["id"], local.id.to_string());

    let stored = app.store.find_by_id(local.id).await.unwrap().unwrap();
    assert_eq!(stored.external_id.as_deref(), Some("g-200"));
    // password login keeps working after linking
    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "crisipo@example.com", "password": "correct-horse"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn verify_email_with_registration_token_then_login() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "first_name": "Posidonio",
                "last_name": "Apamea",
                "email": "posidonio@example.com",
                "password": "sympatheia"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let link = body["data"]["verification_token"].as_str().unwrap().to_string();

    // the link token is not a session
    let (status, _) = app
        .send(Method::GET, "/api/v1/users/me", Some(&link), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(Method::POST, "/api/v1/auth/verify-email", None, Some(json!({"token": link})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Email verified successfully");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "posidonio@example.com", "password": "sympatheia"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(Method::POST, "/api/v1/auth/verify-email", None, Some(json!({"token": "nope"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn google_sign_in_voids_a_squatted_password() {
    let google =
        FakeGoogle::default().with("tok-3", "g-300", "cleantes@example.com", "Cleantes Assos");
    let app = TestApp::with_google(google);
    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "first_name": "Not",
                "last_name": "Cleantes",
                "email": "cleantes@example.com",
                "password": "squatter-pass"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::POST, "/api/v1/auth/google/token", None, Some(json!({"id_token": "tok-3"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["email_verified"], true);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "cleantes@example.com", "password": "squatter-pass"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
