//! Router configuration for the Vidly server.

use super::state::AppState;
use crate::api::{auth, customers, genres, movies, rentals, users};
use axum::{
    Router,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;
use vidly_web::correlation_id_layer;
use vidly_web::handlers::{health_check, readiness};

/// Build the complete Axum router.
///
/// Health checks and `/metrics` are open; each API handler enforces its
/// own access rule through the auth extractors. `/metrics` is mounted only
/// when a Prometheus handle is given.
pub fn build_router(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/auth", post(auth::login))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/me", get(users::me))
        .route("/users/:id", axum::routing::delete(users::delete_user))
        // Catalog
        .route("/genres", get(genres::list_genres).post(genres::create_genre))
        .route(
            "/genres/:id",
            get(genres::get_genre)
                .put(genres::update_genre)
                .delete(genres::delete_genre),
        )
        .route(
            "/movies",
            get(movies::list_movies)
                .post(movies::create_movie)
                .delete(movies::delete_all_movies),
        )
        .route(
            "/movies/:id",
            get(movies::get_movie)
                .put(movies::update_movie)
                .delete(movies::delete_movie),
        )
        // Customers
        .route(
            "/customers",
            get(customers::list_customers)
                .post(customers::create_customer)
                .delete(customers::delete_all_customers),
        )
        .route(
            "/customers/:id",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        )
        // Rentals
        .route("/rentals", get(rentals::list_rentals).post(rentals::create_rental))
        .route("/rentals/:id", get(rentals::get_rental))
        .route("/returns", post(rentals::create_return));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .nest("/api", api_routes);

    if let Some(handle) = metrics {
        router = router.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
