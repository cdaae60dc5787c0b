//! # In-Memory User Store
//!
//! Backing collection for the `/api/users` routes. Records live in a `Vec` so listing
//! preserves insertion order; every mutation takes the write half of a
//! `parking_lot::RwLock` and validates its input before touching the collection, so a
//! rejected request never leaves a partial change behind.
//!
//! Payload validation deliberately follows JavaScript truthiness: a field counts as
//! supplied only when it is present and truthy. In particular `"age": 0` and
//! `"username": ""` are treated as missing.

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::UserRecord;
use metrics::counter;
use parking_lot::RwLock;
use serde_json::{Number, Value};
use tracing::{debug, info};
use uuid::{Uuid, Variant};

pub const MISSING_FIELDS: &str = "Missing required fields";
pub const USER_NOT_FOUND: &str = "User not found";
pub const INVALID_USER_ID: &str = "Invalid user id";

/// Fields supplied by a create or update request, already filtered for truthiness
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPayload {
    pub username: Option<String>,
    pub age: Option<Number>,
    pub hobbies: Option<Vec<String>>,
}

impl UserPayload {
    /// Parse a request body. Malformed JSON is not an error here: it simply yields an
    /// empty payload, which the store then rejects as missing fields.
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                debug!(error = %e, "Request body is not valid JSON, treating as empty payload");
                Self::default()
            }
        }
    }

    /// Keep only the fields that are present, truthy and of the expected type
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let username = match object.get("username") {
            Some(Value::String(name)) if !name.is_empty() => Some(name.clone()),
            _ => None,
        };

        let age = match object.get("age") {
            Some(Value::Number(age)) if age.as_f64() != Some(0.0) => Some(age.clone()),
            _ => None,
        };

        // Arrays are truthy even when empty. Anything else, including a bare string or
        // an array holding non-strings, counts as not supplied.
        let hobbies = match object.get("hobbies") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>(),
            _ => None,
        };

        Self {
            username,
            age,
            hobbies,
        }
    }

    fn is_empty(&self) -> bool {
        self.username.is_none() && self.age.is_none() && self.hobbies.is_none()
    }
}

/// Validate a path identifier: present, hyphenated and a well-formed RFC 4122 UUID
pub fn parse_user_id(id: &str) -> Option<Uuid> {
    if id.len() != 36 {
        return None;
    }

    let uuid = Uuid::parse_str(id).ok()?;
    if uuid.is_nil() || uuid == Uuid::from_u128(u128::MAX) {
        return Some(uuid);
    }

    let version_ok = (1..=8).contains(&uuid.get_version_num());
    (version_ok && uuid.get_variant() == Variant::RFC4122).then_some(uuid)
}

/// Identifiers match on their exact text, so an uppercased form of a stored id
/// is a different, unknown id
fn has_id(user: &UserRecord, id: &str) -> bool {
    user.id.hyphenated().to_string() == id
}

/// Ordered in-memory collection of user records
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<Vec<UserRecord>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in insertion order
    pub fn list(&self) -> Vec<UserRecord> {
        self.users.read().clone()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    /// Fetch one record. The invalid-id message echoes the rejected identifier.
    pub fn get(&self, id: &str) -> GatewayResult<UserRecord> {
        if parse_user_id(id).is_none() {
            return Err(GatewayError::invalid_id(format!("{} {}", INVALID_USER_ID, id)));
        }

        self.users
            .read()
            .iter()
            .find(|user| has_id(user, id))
            .cloned()
            .ok_or_else(|| GatewayError::not_found(USER_NOT_FOUND))
    }

    /// Append a new record with a fresh v4 identifier
    pub fn create(&self, payload: UserPayload) -> GatewayResult<UserRecord> {
        let (Some(username), Some(age)) = (payload.username, payload.age) else {
            return Err(GatewayError::validation(MISSING_FIELDS));
        };

        let user = UserRecord {
            id: Uuid::new_v4(),
            username,
            age,
            hobbies: payload.hobbies.unwrap_or_default(),
        };

        self.users.write().push(user.clone());
        counter!("users_store_mutations_total", "operation" => "create").increment(1);
        info!(user_id = %user.id, "User created");

        Ok(user)
    }

    /// Overwrite the supplied fields of an existing record in place
    pub fn update(&self, id: &str, payload: UserPayload) -> GatewayResult<UserRecord> {
        parse_user_id(id).ok_or_else(|| GatewayError::invalid_id(INVALID_USER_ID))?;

        let mut users = self.users.write();
        let user = users
            .iter_mut()
            .find(|user| has_id(user, id))
            .ok_or_else(|| GatewayError::not_found(USER_NOT_FOUND))?;

        if payload.is_empty() {
            return Err(GatewayError::validation(MISSING_FIELDS));
        }

        if let Some(username) = payload.username {
            user.username = username;
        }
        if let Some(age) = payload.age {
            user.age = age;
        }
        if let Some(hobbies) = payload.hobbies {
            user.hobbies = hobbies;
        }

        counter!("users_store_mutations_total", "operation" => "update").increment(1);
        info!(user_id = %user.id, "User updated");

        Ok(user.clone())
    }

    /// Remove a record, returning it as it was before removal
    pub fn delete(&self, id: &str) -> GatewayResult<UserRecord> {
        parse_user_id(id).ok_or_else(|| GatewayError::invalid_id(INVALID_USER_ID))?;

        let mut users = self.users.write();
        let index = users
            .iter()
            .position(|user| has_id(user, id))
            .ok_or_else(|| GatewayError::not_found(USER_NOT_FOUND))?;

        let removed = users.remove(index);
        counter!("users_store_mutations_total", "operation" => "delete").increment(1);
        info!(user_id = %removed.id, "User deleted");

        Ok(removed)
    }
}
