mod handlers;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adapter::Adapter;
use crate::db::Database;

pub fn create_router(db: Database) -> Router {
    let api = Router::new()
        // Diagnostics
        .route("/health", get(handlers::health))
        .route("/tables", get(handlers::list_tables))
        .route("/tables/{name}", get(handlers::describe_table))
        // Entities
        .route(
            "/{entity_type}",
            get(handlers::list_entities).post(handlers::create_entity),
        )
        .route(
            "/{entity_type}/{id}",
            get(handlers::get_entity)
                .patch(handlers::update_entity)
                .delete(handlers::delete_entity),
        );

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Adapter::new(db))
}
