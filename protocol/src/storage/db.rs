//! # WaypointDb: Persistent Storage Engine
//!
//! The durable side of Waypoint, built on sled's embedded key-value store.
//! One database type serves both ends of the bridge: a device keeps its
//! identity record in it, and the backend keeps its user registry.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                          | Value                     |
//! |------------|------------------------------|---------------------------|
//! | `identity` | `IDENTITY_STORAGE_KEY`       | `json(BridgedIdentity)`   |
//! | `users`    | subject id (UTF-8)           | `bincode(UserRecord)`     |
//!
//! The identity record is JSON so an operator can read it with any sled
//! tool. The user registry is bincode, compact and fast.
//!
//! Ephemeral key material never comes near this module. It lives in the
//! transient slot of the session store and dies with the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;

use crate::config::IDENTITY_STORAGE_KEY;
use crate::identity::LedgerAddress;
use crate::session::BridgedIdentity;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// The backend's record of a registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub subject: String,
    pub address: LedgerAddress,
    pub email: Option<String>,
    pub name: Option<String>,
    pub registered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WaypointDb
// ---------------------------------------------------------------------------

/// Persistent storage for identities and registered users.
///
/// # Thread Safety
///
/// sled trees support lock-free concurrent reads and serialized writes.
/// `WaypointDb` is cheap to clone and can be shared via `Arc` freely.
#[derive(Debug, Clone)]
pub struct WaypointDb {
    db: Db,
    identity: Tree,
    users: Tree,
}

impl WaypointDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is cleaned up automatically when
    /// the last handle is dropped. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let identity = db.open_tree("identity")?;
        let users = db.open_tree("users")?;
        Ok(Self {
            db,
            identity,
            users,
        })
    }

    // -- Identity record ----------------------------------------------------

    /// Persist the device's identity, replacing any previous one.
    ///
    /// Flushed before returning: a login that reports success must survive
    /// a crash.
    pub fn save_identity(&self, identity: &BridgedIdentity) -> DbResult<()> {
        let bytes =
            serde_json::to_vec(identity).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.identity.insert(IDENTITY_STORAGE_KEY, bytes)?;
        self.db.flush()?;
        Ok(())
    }

    /// Load the persisted identity, if any.
    pub fn load_identity(&self) -> DbResult<Option<BridgedIdentity>> {
        match self.identity.get(IDENTITY_STORAGE_KEY)? {
            Some(bytes) => {
                let identity = serde_json::from_slice(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    /// Remove the persisted identity. Idempotent.
    pub fn clear_identity(&self) -> DbResult<()> {
        self.identity.remove(IDENTITY_STORAGE_KEY)?;
        self.db.flush()?;
        Ok(())
    }

    // -- User registry ------------------------------------------------------

    /// Insert or update a user record keyed by subject id.
    ///
    /// Returns `true` if the subject was not registered before.
    pub fn put_user(&self, user: &UserRecord) -> DbResult<bool> {
        let bytes = bincode::serialize(user).map_err(|e| DbError::Serialization(e.to_string()))?;
        let previous = self.users.insert(user.subject.as_bytes(), bytes)?;
        Ok(previous.is_none())
    }

    /// Look up a user by subject id.
    pub fn get_user(&self, subject: &str) -> DbResult<Option<UserRecord>> {
        match self.users.get(subject.as_bytes())? {
            Some(bytes) => {
                let user = bincode::deserialize(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Look up a user, failing with `NotFound` if absent.
    pub fn require_user(&self, subject: &str) -> DbResult<UserRecord> {
        self.get_user(subject)?
            .ok_or_else(|| DbError::NotFound(subject.to_string()))
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
