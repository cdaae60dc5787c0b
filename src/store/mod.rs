//! In-memory storage backing the locally served routes.

pub mod users;

pub use users::{parse_user_id, UserPayload, UserStore};
