pub mod router;

pub use router::{RouteAction, Router, USERS_PATH};
