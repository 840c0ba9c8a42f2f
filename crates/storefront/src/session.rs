//! Current user and durable session state.
//!
//! [`AuthSession`] holds who is signed in and persists it (and the cart)
//! through a [`SessionStore`], so both survive a restart. Role checks here gate
//! which operations the storefront offers; the backend remains the real
//! authorization point.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use bazaar_core::Role;

use crate::cart::CartStore;
use crate::models::User;
use crate::models::session::keys;

/// Errors from durable session storage.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading or writing the backing file failed.
    #[error("session storage I/O failed for {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Stored data could not be encoded or decoded.
    #[error("session data is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A role gate refused an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    /// Nobody is signed in.
    #[error("sign in to {action}")]
    SignedOut {
        /// What was attempted.
        action: &'static str,
    },

    /// The signed-in user's role does not allow the operation.
    #[error("{role} accounts cannot {action}")]
    WrongRole {
        /// Role of the current user.
        role: Role,
        /// What was attempted.
        action: &'static str,
    },

    /// The user may perform the operation, but not on this record.
    #[error("you cannot {action} for another account")]
    NotOwner {
        /// What was attempted.
        action: &'static str,
    },
}

/// Opaque key-value storage for session state.
pub trait SessionStore {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the backing storage cannot be read.
    fn load(&self, key: &str) -> Result<Option<Value>, SessionError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the backing storage cannot be written.
    fn save(&mut self, key: &str, value: Value) -> Result<(), SessionError>;

    /// Delete a value. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the backing storage cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), SessionError>;
}

/// In-memory store, lost when dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: Value) -> Result<(), SessionError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// Every write rewrites the file through a temporary sibling and a rename, so
/// a crash never leaves a half-written session.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the file exists but cannot be read or
    /// does not hold a JSON object.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(SessionError::Io { path, source }),
        };
        debug!(path = %path.display(), keys = entries.len(), "Session store opened");
        Ok(Self { path, entries })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` to disk; the in-memory map is only replaced on success.
    fn commit(&mut self, entries: BTreeMap<String, Value>) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_vec_pretty(&entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        self.entries = entries;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: Value) -> Result<(), SessionError> {
        let mut next = self.entries.clone();
        next.insert(key.to_string(), value);
        self.commit(next)
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionError> {
        if !self.entries.contains_key(key) {
            return Ok(());
        }
        let mut next = self.entries.clone();
        next.remove(key);
        self.commit(next)
    }
}

/// The signed-in user, persisted across restarts.
#[derive(Debug)]
pub struct AuthSession<S> {
    store: S,
    user: Option<User>,
}

impl<S: SessionStore> AuthSession<S> {
    /// Restore the session from `store`.
    ///
    /// A stored user that no longer decodes is discarded and the session
    /// starts signed out.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the store cannot be read or written.
    pub fn restore(mut store: S) -> Result<Self, SessionError> {
        let user = read::<User>(&mut store, keys::CURRENT_USER)?;
        if let Some(user) = &user {
            debug!(user_id = %user.id, role = %user.role, "Session restored");
        }
        Ok(Self { store, user })
    }

    /// Sign in, replacing any current user.
    ///
    /// Switching to a different user forgets the previous user's saved cart.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the user cannot be persisted.
    pub fn login(&mut self, user: User) -> Result<(), SessionError> {
        if self.user.as_ref().is_some_and(|current| current.id != user.id) {
            self.store.remove(keys::CART)?;
        }
        self.store.save(keys::CURRENT_USER, serde_json::to_value(&user)?)?;
        debug!(user_id = %user.id, role = %user.role, "User logged in");
        self.user = Some(user);
        Ok(())
    }

    /// Sign out and forget the saved cart.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the store cannot be written.
    pub fn logout(&mut self) -> Result<(), SessionError> {
        self.store.remove(keys::CURRENT_USER)?;
        self.store.remove(keys::CART)?;
        if let Some(user) = self.user.take() {
            debug!(user_id = %user.id, "User logged out");
        }
        Ok(())
    }

    /// The signed-in user.
    #[must_use]
    pub const fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Whether the signed-in user has `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.user.as_ref().is_some_and(|u| u.role == role)
    }

    /// The signed-in user, if their role is one of `allowed`.
    ///
    /// # Errors
    ///
    /// Returns `SignedOut` with no user, `WrongRole` otherwise.
    pub fn require(&self, allowed: &[Role], action: &'static str) -> Result<&User, AccessDenied> {
        let user = self.user.as_ref().ok_or(AccessDenied::SignedOut { action })?;
        if allowed.contains(&user.role) {
            Ok(user)
        } else {
            Err(AccessDenied::WrongRole {
                role: user.role,
                action,
            })
        }
    }

    /// Persist the cart contents.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the store cannot be written.
    pub fn save_cart(&mut self, cart: &CartStore) -> Result<(), SessionError> {
        self.store.save(keys::CART, serde_json::to_value(cart)?)
    }

    /// Load the saved cart.
    ///
    /// A saved cart that no longer decodes, or whose lines break a cart
    /// invariant, is discarded.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` if the store cannot be read or written.
    pub fn load_cart(&mut self) -> Result<Option<CartStore>, SessionError> {
        let Some(saved) = read::<CartStore>(&mut self.store, keys::CART)? else {
            return Ok(None);
        };
        match CartStore::from_lines(saved.currency(), saved.snapshot()) {
            Ok(cart) => Ok(Some(cart)),
            Err(e) => {
                warn!(error = %e, "Discarding saved cart");
                self.store.remove(keys::CART)?;
                Ok(None)
            }
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }
}

/// Decode a stored value, dropping it if it no longer matches `T`.
fn read<T: DeserializeOwned>(
    store: &mut impl SessionStore,
    key: &str,
) -> Result<Option<T>, SessionError> {
    let Some(value) = store.load(key)? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(decoded) => Ok(Some(decoded)),
        Err(e) => {
            warn!(key, error = %e, "Discarding unreadable session entry");
            store.remove(key)?;
            Ok(None)
        }
    }
}
