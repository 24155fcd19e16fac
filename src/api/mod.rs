/// API routes and handlers
pub mod admin;
pub mod auth;
pub mod catalog;
pub mod content;
pub mod envelope;
pub mod feedback;
pub mod orders;
pub mod payment;
pub mod user;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(user::routes())
        .merge(content::routes())
        .merge(orders::routes())
        .merge(payment::routes())
        .merge(catalog::routes())
        .merge(feedback::routes())
        .merge(admin::routes())
}
