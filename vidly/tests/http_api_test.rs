//! End-to-end tests for the HTTP API on the in-memory store.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use vidly::AppState;
use vidly::auth::{AUTH_TOKEN_HEADER, TokenRegistry, hash_password};
use vidly::build_router;
use vidly_core::error::StoreError;
use vidly_core::store::{Database, RentalStore, Repository};
use vidly_core::types::{Customer, Genre, GenreId, Movie, TransactionId, User};
use vidly_runtime::RentalWorkflow;
use vidly_testing::{InMemoryStore, ManualClock, StoreOp, fixtures};

struct Harness {
    server: TestServer,
    store: Arc<InMemoryStore>,
    clock: ManualClock,
    tokens: TokenRegistry,
    admin: String,
    staff: String,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = ManualClock::new(fixtures::epoch());
        let db: Arc<dyn Database> = store.clone();

        let workflow = RentalWorkflow::new(Arc::clone(&db), Arc::new(clock.clone()));
        let tokens = TokenRegistry::new(Duration::from_secs(30 * 24 * 3600), Arc::new(clock.clone()));

        let admin_user = fixtures::user("root@vidly.test", true);
        let staff_user = fixtures::user("clerk@vidly.test", false);
        Repository::<User>::insert(store.as_ref(), admin_user.clone()).await.unwrap();
        Repository::<User>::insert(store.as_ref(), staff_user.clone()).await.unwrap();
        let admin = tokens.issue(&admin_user);
        let staff = tokens.issue(&staff_user);

        let router = build_router(AppState::new(db, workflow, tokens.clone()), None);
        let server = TestServer::new(router).expect("test server");

        Self {
            server,
            store,
            clock,
            tokens,
            admin,
            staff,
        }
    }

    async fn movie(&self, title: &str, stock: u32, rate_cents: i64) -> Movie {
        let movie = fixtures::movie(title, stock, rate_cents);
        Repository::<Movie>::insert(self.store.as_ref(), movie.clone()).await.unwrap()
    }

    async fn customer(&self, name: &str, rented: u32) -> Customer {
        let customer = fixtures::customer(name, rented);
        Repository::<Customer>::insert(self.store.as_ref(), customer.clone()).await.unwrap()
    }

    async fn reload_movie(&self, movie: &Movie) -> Movie {
        Repository::<Movie>::find(self.store.as_ref(), movie.id).await.unwrap().unwrap()
    }

    async fn reload_customer(&self, customer: &Customer) -> Customer {
        Repository::<Customer>::find(self.store.as_ref(), customer.id).await.unwrap().unwrap()
    }
}

fn with_token(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(
        HeaderName::from_static(AUTH_TOKEN_HEADER),
        HeaderValue::from_str(token).unwrap(),
    )
}

fn rental_body(customer: &Customer, movie: &Movie) -> Value {
    json!({
        "customer_id": customer.id.to_string(),
        "movie_id": movie.id.to_string(),
    })
}

// ============================================================================
// Rentals
// ============================================================================

#[tokio::test]
async fn borrow_takes_a_copy_out() {
    let h = Harness::new().await;
    let movie = h.movie("Casablanca", 3, 200).await;
    let customer = h.customer("Rick Blaine", 0).await;

    let response = with_token(h.server.post("/api/rentals"), &h.staff)
        .json(&rental_body(&customer, &movie))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let receipt: Value = response.json();
    assert_eq!(receipt["rental"]["rental_type"], "borrow");
    assert_eq!(receipt["rental"]["movie"]["title"], "Casablanca");
    assert_eq!(receipt["transaction"]["state"], "done");

    assert_eq!(h.reload_movie(&movie).await.number_in_stock, 2);
    assert_eq!(h.reload_customer(&customer).await.number_of_movies_rented, 1);

    let listed: Value = h.server.get("/api/rentals").await.json();
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let id = receipt["rental"]["id"].as_str().unwrap();
    let fetched = h.server.get(&format!("/api/rentals/{id}")).await;
    assert_eq!(fetched.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn out_of_stock_borrow_changes_nothing() {
    let h = Harness::new().await;
    let movie = h.movie("Vertigo", 0, 200).await;
    let customer = h.customer("Scottie Ferguson", 0).await;

    let response = with_token(h.server.post("/api/rentals"), &h.staff)
        .json(&rental_body(&customer, &movie))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "OUT_OF_STOCK");
    assert_eq!(h.reload_customer(&customer).await.number_of_movies_rented, 0);
    assert!(h.store.rentals().await.is_empty());
}

#[tokio::test]
async fn second_borrow_of_same_movie_names_first_checkout() {
    let h = Harness::new().await;
    let movie = h.movie("Psycho", 5, 200).await;
    let customer = h.customer("Marion Crane", 0).await;

    with_token(h.server.post("/api/rentals"), &h.staff)
        .json(&rental_body(&customer, &movie))
        .await
        .assert_status_ok();

    let response = with_token(h.server.post("/api/rentals"), &h.staff)
        .json(&rental_body(&customer, &movie))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "ALREADY_BORROWED");
    assert!(body["message"].as_str().unwrap().contains("2025-01-01"));
    assert_eq!(h.reload_movie(&movie).await.number_in_stock, 4);
}

#[tokio::test]
async fn return_without_borrow_is_rejected() {
    let h = Harness::new().await;
    let movie = h.movie("Rebecca", 2, 200).await;
    let customer = h.customer("Maxim Winter", 1).await;

    let response = with_token(h.server.post("/api/returns"), &h.staff)
        .json(&rental_body(&customer, &movie))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_BORROWED");
    assert_eq!(h.reload_movie(&movie).await.number_in_stock, 2);
}

#[tokio::test]
async fn return_charges_whole_days() {
    let h = Harness::new().await;
    let movie = h.movie("Notorious", 1, 200).await;
    let customer = h.customer("Alicia Huberman", 0).await;

    with_token(h.server.post("/api/rentals"), &h.staff)
        .json(&rental_body(&customer, &movie))
        .await
        .assert_status_ok();

    h.clock.advance(chrono::Duration::days(7) + chrono::Duration::hours(5));

    let response = with_token(h.server.post("/api/returns"), &h.staff)
        .json(&rental_body(&customer, &movie))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let receipt: Value = response.json();
    assert_eq!(receipt["rental"]["rental_type"], "return");
    assert_eq!(receipt["rental"]["rental_fee"], 1400);

    assert_eq!(h.reload_movie(&movie).await.number_in_stock, 1);
    assert_eq!(h.reload_customer(&customer).await.number_of_movies_rented, 0);

    let returned: Value = h.server.get("/api/rentals?rental_type=return").await.json();
    assert_eq!(returned.as_array().map(Vec::len), Some(1));
    h.server
        .get("/api/rentals")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_rental_write_is_rolled_back() {
    let h = Harness::new().await;
    let movie = h.movie("Spellbound", 2, 200).await;
    let customer = h.customer("Constance Petersen", 0).await;
    h.store.fail(StoreOp::InsertRental, StoreError::Backend("disk full".to_string()));

    let response = with_token(h.server.post("/api/rentals"), &h.staff)
        .json(&rental_body(&customer, &movie))
        .await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.reload_movie(&movie).await.number_in_stock, 2);
    assert_eq!(h.reload_customer(&customer).await.number_of_movies_rented, 0);
    assert!(h.store.rentals().await.is_empty());
}

#[tokio::test]
async fn unknown_records_and_malformed_ids() {
    let h = Harness::new().await;
    let movie = h.movie("Rope", 1, 200).await;
    let ghost = fixtures::customer("Nobody Home", 0);

    let response = with_token(h.server.post("/api/rentals"), &h.staff)
        .json(&rental_body(&ghost, &movie))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = h.server.get("/api/rentals/not-a-uuid").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["message"], "Invalid ID.");

    let response = with_token(h.server.post("/api/rentals"), &h.staff)
        .json(&json!({ "customer_id": "42", "movie_id": movie.id.to_string() }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    h.server
        .get("/api/rentals?rental_type=lost")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn protected_routes_check_the_token() {
    let h = Harness::new().await;

    let response = h.server.get("/api/customers").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["message"], "Access denied. No token provided.");

    with_token(h.server.get("/api/customers"), "forged")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    with_token(h.server.delete("/api/movies"), &h.staff)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    with_token(h.server.delete("/api/movies"), &h.admin)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn login_issues_a_working_token() {
    let h = Harness::new().await;
    let mut user = fixtures::user("ilsa@vidly.test", false);
    user.password_hash = hash_password("As7ime$GoesBy").unwrap();
    Repository::<User>::insert(h.store.as_ref(), user).await.unwrap();

    let response = h
        .server
        .post("/api/auth")
        .json(&json!({ "email": "ilsa@vidly.test", "password": "wrong" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["message"], "Invalid email or password.");

    let response = h
        .server
        .post("/api/auth")
        .json(&json!({ "email": "ILSA@vidly.test", "password": "As7ime$GoesBy" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let token = response.json::<Value>()["token"].as_str().unwrap().to_string();

    let me: Value = with_token(h.server.get("/api/users/me"), &token).await.json();
    assert_eq!(me["email"], "ilsa@vidly.test");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn admins_create_and_delete_users() {
    let h = Harness::new().await;
    let body = json!({
        "name": "Victor Laszlo",
        "email": "victor@vidly.test",
        "password": "Res1stance!",
    });

    with_token(h.server.post("/api/users"), &h.staff)
        .json(&body)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = with_token(h.server.post("/api/users"), &h.admin).json(&body).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let token = response.header(AUTH_TOKEN_HEADER);
    let created: Value = response.json();
    let identity = h.tokens.resolve(token.to_str().unwrap()).unwrap();
    assert_eq!(created["id"], identity.user_id.to_string());

    with_token(h.server.post("/api/users"), &h.admin)
        .json(&body)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let id = created["id"].as_str().unwrap();
    with_token(h.server.delete(&format!("/api/users/{id}")), &h.admin)
        .await
        .assert_status_ok();
    assert!(h.tokens.resolve(token.to_str().unwrap()).is_err());
}

// ============================================================================
// Catalog and customers
// ============================================================================

#[tokio::test]
async fn genres_and_movies_validate_input() {
    let h = Harness::new().await;

    let response = with_token(h.server.post("/api/genres"), &h.staff)
        .json(&json!({ "name": "Sci" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let genre: Value = with_token(h.server.post("/api/genres"), &h.staff)
        .json(&json!({ "name": "Film Noir" }))
        .await
        .json();
    let genre_id = genre["id"].as_str().unwrap().to_string();

    let response = with_token(h.server.post("/api/movies"), &h.staff)
        .json(&json!({
            "title": "The Third Man",
            "genre_id": GenreId::new(),
            "number_in_stock": 4,
            "daily_rental_rate": 250,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = with_token(h.server.post("/api/movies"), &h.staff)
        .json(&json!({
            "title": "The Third Man",
            "genre_id": genre_id,
            "number_in_stock": 4,
            "daily_rental_rate": 250,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let movie: Value = response.json();
    assert_eq!(movie["genre"]["name"], "Film Noir");

    let missing = GenreId::new();
    let response = h.server.get(&format!("/api/genres/{missing}")).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["message"], "The genre with the given ID was not found.");
}

#[tokio::test]
async fn customer_updates_keep_the_rented_count() {
    let h = Harness::new().await;
    let customer = h.customer("Sam Spade", 3).await;

    let response = with_token(h.server.put(&format!("/api/customers/{}", customer.id)), &h.staff)
        .json(&json!({
            "name": "Samuel Spade",
            "phone": "4155550199",
            "is_gold": true,
            "number_of_movies_rented": 0,
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["number_of_movies_rented"], 3);
    let stored = h.reload_customer(&customer).await;
    assert_eq!(stored.name, "Samuel Spade");
    assert!(stored.is_gold);
    assert_eq!(stored.number_of_movies_rented, 3);

    with_token(h.server.put(&format!("/api/customers/{}", customer.id)), &h.staff)
        .json(&json!({ "name": "Sam", "phone": "123" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn edits_during_a_rental_keep_its_markers() {
    let h = Harness::new().await;
    let genre = fixtures::genre("Film Noir");
    Repository::<Genre>::insert(h.store.as_ref(), genre.clone()).await.unwrap();
    let movie = h.movie("The Third Man", 3, 250).await;
    let customer = h.customer("Holly Martins", 0).await;

    // A borrow that has written stock and count but not yet completed.
    let marker = TransactionId::new();
    h.store.adjust_movie_stock(movie.id, -1, Some(marker)).await.unwrap();
    h.store
        .adjust_customer_rentals(customer.id, 1, Some(marker))
        .await
        .unwrap();

    with_token(h.server.put(&format!("/api/customers/{}", customer.id)), &h.staff)
        .json(&json!({ "name": "Holly Martins", "phone": "4155550123" }))
        .await
        .assert_status_ok();
    with_token(h.server.put(&format!("/api/movies/{}", movie.id)), &h.staff)
        .json(&json!({
            "title": "The Third Man",
            "genre_id": genre.id,
            "number_in_stock": 2,
            "daily_rental_rate": 300,
        }))
        .await
        .assert_status_ok();

    let stored_customer = h.reload_customer(&customer).await;
    assert_eq!(stored_customer.phone, "4155550123");
    assert_eq!(stored_customer.number_of_movies_rented, 1);
    assert_eq!(stored_customer.pending_transactions, vec![marker]);
    let stored_movie = h.reload_movie(&movie).await;
    assert_eq!(stored_movie.daily_rental_rate.cents(), 300);
    assert_eq!(stored_movie.pending_transactions, vec![marker]);
}

#[tokio::test]
async fn health_endpoints() {
    let h = Harness::new().await;
    h.server.get("/health").await.assert_status_ok();
    h.server.get("/ready").await.assert_status_ok();

    h.store.fail(StoreOp::Ping, StoreError::Backend("down".to_string()));
    h.server
        .get("/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
