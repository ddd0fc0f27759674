//! AWS Backend Scaffold
//!
//! A cached AWS client factory, a bucket-scoped S3 wrapper and a minimal
//! Actix-Web service.

use std::sync::Arc;

pub mod api;
pub mod aws;
pub mod config;
pub mod storage;

use crate::aws::ClientRegistry;
use crate::config::Settings;
use crate::storage::S3Service;

/// Application state shared across all handlers
///
/// Startup wiring: `main` builds the settings, the client registry and the
/// optional storage wrapper once and registers them here as `web::Data`.
/// The only route today (`GET /`) reads none of them; handlers that need
/// AWS access take `web::Data<AppState>` instead of building clients.
pub struct AppState {
    pub settings: Settings,
    pub clients: Arc<ClientRegistry>,
    pub storage: Option<S3Service>,
}
