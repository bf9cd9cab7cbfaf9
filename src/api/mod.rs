//! Caller-facing surfaces over the ingestion core.
//!
//! Transport is out of scope: these types take an already authenticated
//! [`Caller`] and enforce privilege, ownership and input bounds before any
//! call reaches the engines. Any RPC or REST layer wraps them directly; every
//! returned type serializes with camelCase field names.

mod admin;
mod sources;

pub use admin::{AdminControl, DEFAULT_CHECK_INTERVAL_MINUTES};
pub use sources::{AddSourceRequest, SourceApi};

use thiserror::Error;

use crate::feed::SyncError;
use crate::storage::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

/// An authenticated user as identified by the outer layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::User,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
