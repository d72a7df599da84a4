//! API integration tests
//!
//! Drive the full router in-process against the in-memory backend.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio_test::assert_ok;
use tower::ServiceExt;

use hellobooks_server::{api, config::AppConfig, repository::Repository, AppState};

const ADMIN_PASSWORD: &str = "admin-password";

/// Router over a fresh memory store with the configured admin bootstrapped
async fn app() -> Router {
    let mut config = AppConfig::default();
    config.admin.password = ADMIN_PASSWORD.to_string();

    let state = AppState::new(config, Repository::in_memory());
    assert_ok!(state.services.users.ensure_admin(&state.config.admin).await);
    api::router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn signin(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/users/signin",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

/// Returns (token, user id)
async fn signup(app: &Router, username: &str) -> (String, i64) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/users/signup",
        None,
        Some(json!({
            "username": username,
            "email": format!("{}@hellobooks.test", username),
            "password": "secret-pass"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

/// Admin creates the Fiction category and one book; returns the book id
async fn seed_book(app: &Router, admin: &str, copies: i32) -> i64 {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/v1/books/category",
        Some(admin),
        Some(json!({ "category": "Fiction" })),
    )
    .await;
    assert!(status == StatusCode::CREATED || status == StatusCode::CONFLICT);

    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/books",
        Some(admin),
        Some(json!({
            "title": "Dune",
            "author": "Frank Herbert",
            "category": "fiction",
            "totalCopies": copies
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["book"]["availableCopies"], copies);
    body["book"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_welcome_and_health() {
    let app = app().await;

    let (status, body) = send(&app, Method::GET, "/api/v1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("Hello Books"));

    let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_lost() {
    let app = app().await;
    for uri in ["/nowhere", "/api/v1/nowhere"] {
        let (status, body) = send(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Seems like you might be lost");
    }
}

#[tokio::test]
async fn test_signup_and_signin() {
    let app = app().await;
    let (token, _) = signup(&app, "reader").await;
    assert!(!token.is_empty());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/users/signup",
        None,
        Some(json!({ "username": "reader", "email": "other@hellobooks.test", "password": "secret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Username already taken");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/users/signin",
        None,
        Some(json!({ "username": "reader", "password": "wrong-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["user"].is_null());

    signin(&app, "reader", "secret-pass").await;
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = app().await;
    let category = Some(json!({ "category": "Poetry" }));

    let (status, _) = send(&app, Method::POST, "/api/v1/books/category", None, category.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/books/category",
        Some("not-a-jwt"),
        category.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (member, _) = signup(&app, "reader").await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/books/category",
        Some(&member),
        category.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, "/api/v1/admin-notifications", Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = signin(&app, "admin", ADMIN_PASSWORD).await;
    let (status, body) = send(&app, Method::POST, "/api/v1/books/category", Some(&admin), category).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["category"]["name"], "Poetry");

    let (status, body) = send(&app, Method::GET, "/api/v1/books/category", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_single_copy_borrow_and_return() {
    let app = app().await;
    let admin = signin(&app, "admin", ADMIN_PASSWORD).await;
    let book_id = seed_book(&app, &admin, 1).await;
    let (first, first_id) = signup(&app, "first").await;
    let (second, second_id) = signup(&app, "second").await;
    let borrow = Some(json!({ "bookId": book_id }));

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/users/{}/books", first_id),
        Some(&first),
        borrow.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["message"], "You have successfully borrowed the book");
    assert_eq!(body["transaction"]["bookId"], book_id);
    assert!(body["transaction"]["returnedAt"].is_null());

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/users/{}/books", first_id),
        Some(&first),
        borrow.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/users/{}/books", second_id),
        Some(&second),
        borrow.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "There are no copies of this book left to borrow");

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/books/{}", book_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["availableCopies"], 0);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/users/{}/books", first_id),
        Some(&first),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["books"].as_array().unwrap().len(), 1);
    assert_eq!(body["books"][0]["book"]["title"], "Dune");
    assert_eq!(body["books"][0]["overdue"], false);

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/users/{}/books", first_id),
        Some(&first),
        borrow.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["transaction"]["returnedAt"].is_string());

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/users/{}/books", first_id),
        Some(&first),
        borrow,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, Method::GET, &format!("/api/v1/books/{}", book_id), None, None).await;
    assert_eq!(body["book"]["availableCopies"], 1);

    let (status, body) = send(&app, Method::GET, "/api/v1/admin-notifications", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<_> = body["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["return", "borrow"]);
}

#[tokio::test]
async fn test_members_only_see_their_own_books() {
    let app = app().await;
    let (first, first_id) = signup(&app, "first").await;
    let (second, _) = signup(&app, "second").await;
    let uri = format!("/api/v1/users/{}/books", first_id);

    let (status, _) = send(&app, Method::GET, &uri, Some(&second), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::GET, &uri, Some(&first), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["books"].as_array().unwrap().is_empty());

    let admin = signin(&app, "admin", ADMIN_PASSWORD).await;
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/users/{}/transactions", first_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_requests_are_bad_requests() {
    let app = app().await;

    let (status, _) = send(&app, Method::GET, "/api/v1/books?limit=0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/v1/books?offset=abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/v1/books/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/api/v1/books/42", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].is_string());

    let (token, id) = signup(&app, "reader").await;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/users/{}/books", id),
        Some(&token),
        Some(json!({ "book": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_book_listing_and_deletion() {
    let app = app().await;
    let admin = signin(&app, "admin", ADMIN_PASSWORD).await;
    let first = seed_book(&app, &admin, 2).await;
    seed_book(&app, &admin, 1).await;

    let (status, body) = send(&app, Method::GET, "/api/v1/books?limit=1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["books"].as_array().unwrap().len(), 1);
    assert_eq!(body["total"], 2);

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/books/{}", first),
        Some(&admin),
        Some(json!({ "totalCopies": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["availableCopies"], 4);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/books/{}", first), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, "/api/v1/books", None, None).await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_blank_fields_are_rejected() {
    let app = app().await;
    let admin = signin(&app, "admin", ADMIN_PASSWORD).await;
    let book_id = seed_book(&app, &admin, 1).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(&admin),
        Some(json!({ "title": "   ", "author": "  ", "category": "Fiction", "totalCopies": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/books/{}", book_id),
        Some(&admin),
        Some(json!({ "title": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/users/signup",
        None,
        Some(json!({ "username": "  ab  ", "email": "ab@hellobooks.test", "password": "secret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
