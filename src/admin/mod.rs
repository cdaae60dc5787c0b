//! Admin API served on its own listener when `server.admin_port` is set.

pub mod endpoints;

pub use endpoints::{AdminRouter, AdminState};
