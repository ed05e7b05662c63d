//! The user table backing REGISTER handling.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use ahash::{HashMap, HashMapExt};

/// One REGISTERed binding.
#[derive(Debug, Clone)]
pub struct Registration {
    pub contact: String,
    pub expires: Duration,
    pub remote: SocketAddr,
    pub registered_at: Instant,
}

impl Registration {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.registered_at) >= self.expires
    }
}

/// The user table keyed by URI user-part, exclusively owned by the
/// user-agent — no other task ever touches it directly.
#[derive(Debug, Default)]
pub struct Registrar {
    users: HashMap<String, Registration>,
}

impl Registrar {
    pub fn register(&mut self, user: impl Into<String>, registration: Registration) {
        self.users.insert(user.into(), registration);
    }

    pub fn lookup(&self, user: &str) -> Option<&Registration> {
        self.users.get(user)
    }

    pub fn is_registered(&self, user: &str) -> bool {
        self.users.contains_key(user)
    }

    pub fn remove(&mut self, user: &str) -> Option<Registration> {
        self.users.remove(user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Drop bindings whose `expires` has elapsed as of `now`.
    pub fn expire(&mut self, now: Instant) {
        self.users.retain(|_, registration| !registration.is_expired(now));
    }

    /// Immutable snapshot of the currently registered usernames.
    pub fn users(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }
}
