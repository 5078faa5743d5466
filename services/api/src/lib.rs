//! Mentor API Library Crate
//!
//! This library contains all the logic of the diagnostic web service,
//! including the application state, data access, the diagnostic state machine,
//! API handlers, WebSocket notifications, and routing. The `api` binary is a
//! thin wrapper around this library.

pub mod config;
pub mod db;
pub mod diagnostic;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
