//! Response cache rows.
//!
//! One row per request key, holding the serialized payload exactly as the
//! remote returned it. Matching logic lives in `cratedig-client`; this
//! module only moves bytes.

use cratedig_core::StorageError;
use serde_json::Value;

use crate::store::{de_err, ser_err, txn_err, Store};

impl Store {
    /// Store a payload under a request key, replacing any previous entry.
    pub fn put_response(&self, key: &str, payload: &Value) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| ser_err("response payload", e))?;
        let mut wtxn = self.inner.env.write_txn().map_err(txn_err)?;
        self.inner
            .responses
            .put(&mut wtxn, key, &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)
    }

    /// Fetch the payload cached under a request key.
    pub fn get_response(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        match self.inner.responses.get(&rtxn, key).map_err(txn_err)? {
            Some(bytes) => {
                let value =
                    serde_json::from_slice(bytes).map_err(|e| de_err("response payload", e))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Delete one entry by exact key. Returns whether a row existed.
    pub fn delete_response(&self, key: &str) -> Result<bool, StorageError> {
        let mut wtxn = self.inner.env.write_txn().map_err(txn_err)?;
        let existed = self
            .inner
            .responses
            .delete(&mut wtxn, key)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(existed)
    }

    /// Delete a batch of entries in one transaction. Returns how many rows
    /// actually existed.
    pub fn delete_responses(&self, keys: &[String]) -> Result<u64, StorageError> {
        let mut wtxn = self.inner.env.write_txn().map_err(txn_err)?;
        let mut removed = 0u64;
        for key in keys {
            if self
                .inner
                .responses
                .delete(&mut wtxn, key)
                .map_err(txn_err)?
            {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    /// Number of cached responses.
    pub fn response_count(&self) -> Result<u64, StorageError> {
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        self.inner.responses.len(&rtxn).map_err(txn_err)
    }

    /// Every cached row as (key, raw payload bytes).
    ///
    /// Callers filter on the key first so payloads only get parsed when a
    /// payload predicate is actually present.
    pub fn response_entries(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        let mut entries = Vec::new();
        let iter = self.inner.responses.iter(&rtxn).map_err(txn_err)?;
        for result in iter {
            let (key, bytes) = result.map_err(txn_err)?;
            entries.push((key.to_string(), bytes.to_vec()));
        }
        Ok(entries)
    }
}
