//! # Router Module
//!
//! Decides, per request, whether the users API handles it locally or whether it is
//! forwarded to a worker. Paths are matched with the `matchit` radix tree; the method
//! is checked afterwards. The dispatch table, first match wins:
//!
//! | Method | Path              | Action        |
//! |--------|-------------------|---------------|
//! | GET    | `/api/users`      | list          |
//! | GET    | `/api/users/{id}` | get           |
//! | POST   | `/api/users`      | create        |
//! | PUT    | `/api/users/{id}` | update        |
//! | DELETE | `/api/users/{id}` | delete        |
//! | *      | *                 | forward       |
//!
//! The router holds no per-request state; one instance is shared by every handler.

use crate::core::error::{GatewayError, GatewayResult};
use axum::http::Method;
use matchit::Router as RadixRouter;

pub const USERS_PATH: &str = "/api/users";
const USER_ITEM_PATH: &str = "/api/users/:id";

/// Which resource a path addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Collection,
    Item,
}

/// Outcome of routing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    ListUsers,
    GetUser(String),
    CreateUser,
    UpdateUser(String),
    DeleteUser(String),
    /// Not a users API call; relay it to a worker
    Forward,
}

impl RouteAction {
    /// Whether the handler needs the full request body before it can run
    pub fn reads_body(&self) -> bool {
        matches!(self, Self::CreateUser | Self::UpdateUser(_))
    }

    /// Short label for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListUsers => "list_users",
            Self::GetUser(_) => "get_user",
            Self::CreateUser => "create_user",
            Self::UpdateUser(_) => "update_user",
            Self::DeleteUser(_) => "delete_user",
            Self::Forward => "forward",
        }
    }
}

/// Request router for the users API
pub struct Router {
    routes: RadixRouter<Resource>,
}

impl Router {
    /// Create a router with the users API routes installed
    pub fn new() -> GatewayResult<Self> {
        let mut routes = RadixRouter::new();
        routes
            .insert(USERS_PATH, Resource::Collection)
            .map_err(|e| GatewayError::config(format!("Failed to add route: {}", e)))?;
        routes
            .insert(USER_ITEM_PATH, Resource::Item)
            .map_err(|e| GatewayError::config(format!("Failed to add route: {}", e)))?;

        Ok(Self { routes })
    }

    /// Resolve a method and path (without query string) to an action
    pub fn resolve(&self, method: &Method, path: &str) -> RouteAction {
        let (resource, id) = match self.routes.at(path) {
            Ok(matched) => (
                *matched.value,
                matched.params.get("id").unwrap_or_default().to_string(),
            ),
            // `/api/users/` addresses an item with an empty id
            Err(_) if path == "/api/users/" => {
                (Resource::Item, String::new())
            }
            Err(_) => return RouteAction::Forward,
        };

        match (resource, method) {
            (Resource::Collection, &Method::GET) => RouteAction::ListUsers,
            (Resource::Collection, &Method::POST) => RouteAction::CreateUser,
            (Resource::Item, &Method::GET) => RouteAction::GetUser(id),
            (Resource::Item, &Method::PUT) => RouteAction::UpdateUser(id),
            (Resource::Item, &Method::DELETE) => RouteAction::DeleteUser(id),
            _ => RouteAction::Forward,
        }
    }
}
