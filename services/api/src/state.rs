//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the data store and the diagnostic service.

use crate::{config::Config, db::DiagnosticStore, diagnostic::DiagnosticService, ws::hub::NotificationHub};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DiagnosticStore>,
    pub diagnostics: Arc<DiagnosticService>,
    pub hub: Arc<dyn NotificationHub>,
    pub config: Arc<Config>,
}
