//! API module - HTTP routes and handlers

pub mod handlers;

use actix_web::web;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::root::root));
}
