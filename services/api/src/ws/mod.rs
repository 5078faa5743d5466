//! WebSocket Notifications
//!
//! Users keep a socket open on `/ws?userId=...` and receive the notifications
//! addressed to them:
//!
//! - `hub`: the in-process publish/subscribe channel services publish into.
//! - `protocol`: the JSON frames sent to the browser.
//! - `session`: the connection lifecycle, from upgrade to close.

pub mod hub;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
