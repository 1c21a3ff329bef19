//! Encrypted database held by the server: a concurrent map from 32-byte
//! search tokens to opaque records.

use dashmap::DashMap;

use crate::{crypto::Digest, error::RsseError};

/// Token-addressed record store.
///
/// Reads take `&self`. [`EncryptedDatabase::take`] removes the entry in the
/// same step it reads it, so when two identical queries race on one token
/// exactly one of them obtains the record and the other sees
/// [`RsseError::ChainExhausted`]. This delete-on-read is the only shared
/// mutable state of a running server.
#[derive(Debug)]
pub struct EncryptedDatabase<R> {
    entries: DashMap<Digest, R>,
}

impl<R: Clone> Default for EncryptedDatabase<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone> EncryptedDatabase<R> {
    pub fn new() -> Self {
        EncryptedDatabase {
            entries: DashMap::new(),
        }
    }

    /// Stores `record` under `token`, replacing any previous record.
    pub fn insert(&self, token: Digest, record: R) -> Option<R> {
        self.entries.insert(token, record)
    }

    /// Copy of the record under `token`, leaving it in place.
    pub fn get(&self, token: &Digest) -> Option<R> {
        self.entries.get(token).map(|entry| entry.value().clone())
    }

    /// Atomically removes and returns the record under `token`.
    pub fn take(&self, token: &Digest) -> Result<R, RsseError> {
        self.entries
            .remove(token)
            .map(|(_, record)| record)
            .ok_or(RsseError::ChainExhausted)
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains(&self, token: &Digest) -> bool {
        self.entries.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
