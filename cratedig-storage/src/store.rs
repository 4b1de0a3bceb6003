//! Store handle and environment bootstrap.

use std::path::Path;
use std::sync::Arc;

use cratedig_core::StorageError;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RwTxn};

/// Current store-level schema version (database layout, not record shape).
pub const STORE_VERSION: u32 = 1;

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Separator byte between an indexed value and the primary-key suffix in
/// secondary index rows. Never occurs in valid UTF-8, so string-valued
/// indexes cannot collide with it.
pub(crate) const SEPARATOR: u8 = 0xFF;

/// Shared handle to the persistent store.
///
/// Cloning is cheap (one `Arc`); every clone sees the same environment.
#[derive(Clone, Debug)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

#[derive(Debug)]
pub(crate) struct StoreInner {
    pub(crate) env: Env,
    pub(crate) meta: Database<Str, Bytes>,
    pub(crate) responses: Database<Str, Bytes>,
    pub(crate) artists: Database<Bytes, Bytes>,
    pub(crate) artists_by_name: Database<Bytes, Bytes>,
    pub(crate) releases: Database<Bytes, Bytes>,
    pub(crate) releases_by_master: Database<Bytes, Bytes>,
    pub(crate) releases_by_year: Database<Bytes, Bytes>,
    pub(crate) artist_roles: Database<Str, Bytes>,
    pub(crate) roles_by_artist: Database<Bytes, Bytes>,
    pub(crate) roles_by_release: Database<Bytes, Bytes>,
    pub(crate) roles_by_role: Database<Bytes, Bytes>,
}

pub(crate) fn txn_err(e: heed::Error) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

pub(crate) fn ser_err(what: &str, e: serde_json::Error) -> StorageError {
    StorageError::Serialization {
        what: what.to_string(),
        reason: e.to_string(),
    }
}

pub(crate) fn de_err(what: &str, e: serde_json::Error) -> StorageError {
    StorageError::Deserialization {
        what: what.to_string(),
        reason: e.to_string(),
    }
}

/// Build a secondary index row key: `value ++ SEPARATOR ++ primary_key`.
pub(crate) fn index_key(value: &[u8], pk: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(value.len() + 1 + pk.len());
    key.extend_from_slice(value);
    key.push(SEPARATOR);
    key.extend_from_slice(pk);
    key
}

/// Prefix selecting every index row for one indexed value.
pub(crate) fn bucket_prefix(value: &[u8]) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(value.len() + 1);
    prefix.extend_from_slice(value);
    prefix.push(SEPARATOR);
    prefix
}

impl Store {
    /// Open (or create) the store at `path`.
    ///
    /// Bootstraps every named database inside one write transaction and
    /// records the store schema version. A store written by a newer
    /// version is refused; an older one is migrated additively (missing
    /// databases get created, the version is rewritten).
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&path).map_err(|e| StorageError::EnvOpen {
            reason: e.to_string(),
        })?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(16)
                .open(path.as_ref())
        }
        .map_err(|e| StorageError::EnvOpen {
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;

        let meta = create_db::<Str>(&env, &mut wtxn, "meta")?;

        if let Some(found) = read_version(&meta, &wtxn)? {
            if found > STORE_VERSION {
                wtxn.abort();
                return Err(StorageError::SchemaTooNew {
                    found,
                    supported: STORE_VERSION,
                });
            }
            if found < STORE_VERSION {
                tracing::info!(found, current = STORE_VERSION, "migrating store schema");
            }
        }

        let responses = create_db::<Str>(&env, &mut wtxn, "responses")?;
        let artists = create_db::<Bytes>(&env, &mut wtxn, "artists")?;
        let artists_by_name = create_db::<Bytes>(&env, &mut wtxn, "artists_by_name")?;
        let releases = create_db::<Bytes>(&env, &mut wtxn, "releases")?;
        let releases_by_master = create_db::<Bytes>(&env, &mut wtxn, "releases_by_master")?;
        let releases_by_year = create_db::<Bytes>(&env, &mut wtxn, "releases_by_year")?;
        let artist_roles = create_db::<Str>(&env, &mut wtxn, "artist_roles")?;
        let roles_by_artist = create_db::<Bytes>(&env, &mut wtxn, "roles_by_artist")?;
        let roles_by_release = create_db::<Bytes>(&env, &mut wtxn, "roles_by_release")?;
        let roles_by_role = create_db::<Bytes>(&env, &mut wtxn, "roles_by_role")?;

        let version_bytes = STORE_VERSION.to_le_bytes();
        meta.put(&mut wtxn, SCHEMA_VERSION_KEY, &version_bytes[..])
            .map_err(txn_err)?;

        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                env,
                meta,
                responses,
                artists,
                artists_by_name,
                releases,
                releases_by_master,
                releases_by_year,
                artist_roles,
                roles_by_artist,
                roles_by_release,
                roles_by_role,
            }),
        })
    }

    /// The store-level schema version currently recorded on disk.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        Ok(read_version(&self.inner.meta, &rtxn)?.unwrap_or(0))
    }

    /// Collect index row values (primary keys) for one bucket of a
    /// secondary index. Iterates and filters rather than depending on
    /// backend range APIs.
    pub(crate) fn scan_index(
        &self,
        db: &Database<Bytes, Bytes>,
        prefix: &[u8],
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        let mut values = Vec::new();
        let iter = db.iter(&rtxn).map_err(txn_err)?;
        for result in iter {
            let (key, value) = result.map_err(txn_err)?;
            if key.len() >= prefix.len() && &key[0..prefix.len()] == prefix {
                values.push(value.to_vec());
            }
        }
        Ok(values)
    }
}

fn create_db<KC: 'static>(
    env: &Env,
    wtxn: &mut RwTxn<'_>,
    name: &str,
) -> Result<Database<KC, Bytes>, StorageError> {
    env.create_database(wtxn, Some(name))
        .map_err(|e| StorageError::DbOpen {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

fn read_version(
    meta: &Database<Str, Bytes>,
    txn: &heed::RoTxn<'_>,
) -> Result<Option<u32>, StorageError> {
    match meta.get(txn, SCHEMA_VERSION_KEY).map_err(txn_err)? {
        Some(bytes) => {
            let raw: [u8; 4] = bytes.try_into().map_err(|_| StorageError::Deserialization {
                what: "schema_version".to_string(),
                reason: "expected 4 bytes".to_string(),
            })?;
            Ok(Some(u32::from_le_bytes(raw)))
        }
        None => Ok(None),
    }
}
