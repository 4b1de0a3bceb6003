//! Entity stores with secondary indexes.
//!
//! Primary rows are keyed by big-endian numeric id (artists, releases) or
//! by composite string id (artist/role join rows). Every secondary index
//! row is `indexed_value ++ SEPARATOR ++ primary_key` with the primary key
//! as the row value, so one bucket scan yields primary keys directly.
//!
//! All index maintenance happens in the same write transaction as the
//! primary row, including the join-row reconciliation performed by
//! [`Store::put_release_with_roles`].

use std::collections::HashSet;

use cratedig_core::{Artist, ArtistId, ArtistRole, MasterId, Release, ReleaseId, StorageError};
use heed::types::Bytes;
use heed::{Database, RoTxn};

use crate::store::{bucket_prefix, de_err, index_key, ser_err, txn_err, Store};

/// Collect index row values for one bucket inside an existing transaction.
fn scan_bucket(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn<'_>,
    prefix: &[u8],
) -> Result<Vec<Vec<u8>>, StorageError> {
    let mut values = Vec::new();
    let iter = db.iter(txn).map_err(txn_err)?;
    for result in iter {
        let (key, value) = result.map_err(txn_err)?;
        if key.len() >= prefix.len() && &key[0..prefix.len()] == prefix {
            values.push(value.to_vec());
        }
    }
    Ok(values)
}

fn id_from_be(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}

impl Store {
    // === Artists ===

    /// Write an artist record, keeping the name index in step.
    pub fn put_artist(&self, artist: &Artist) -> Result<(), StorageError> {
        let pk = artist.id.0.to_be_bytes();
        let value = serde_json::to_vec(artist).map_err(|e| ser_err("artist", e))?;

        let mut wtxn = self.inner.env.write_txn().map_err(txn_err)?;

        // Drop the old name index row when the name changed. An
        // undecodable old row just loses its index entry with it.
        let old: Option<Artist> = match self.inner.artists.get(&wtxn, &pk[..]).map_err(txn_err)? {
            Some(bytes) => serde_json::from_slice(bytes).ok(),
            None => None,
        };
        if let Some(old) = old {
            if old.name != artist.name {
                let old_idx = index_key(old.name.as_bytes(), &pk);
                self.inner
                    .artists_by_name
                    .delete(&mut wtxn, &old_idx)
                    .map_err(txn_err)?;
            }
        }

        self.inner
            .artists
            .put(&mut wtxn, &pk[..], &value)
            .map_err(txn_err)?;
        let idx = index_key(artist.name.as_bytes(), &pk);
        self.inner
            .artists_by_name
            .put(&mut wtxn, &idx, &pk[..])
            .map_err(txn_err)?;

        wtxn.commit().map_err(txn_err)
    }

    pub fn get_artist(&self, id: ArtistId) -> Result<Option<Artist>, StorageError> {
        let pk = id.0.to_be_bytes();
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        match self.inner.artists.get(&rtxn, &pk[..]).map_err(txn_err)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(bytes).map_err(|e| de_err("artist", e))?,
            )),
            None => Ok(None),
        }
    }

    /// Every persisted artist id, for bulk warm-up.
    pub fn artist_ids(&self) -> Result<Vec<ArtistId>, StorageError> {
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        let mut ids = Vec::new();
        let iter = self.inner.artists.iter(&rtxn).map_err(txn_err)?;
        for result in iter {
            let (key, _) = result.map_err(txn_err)?;
            if let Some(id) = id_from_be(key) {
                ids.push(ArtistId(id));
            }
        }
        Ok(ids)
    }

    /// Exact-name index lookup.
    pub fn artist_ids_by_name(&self, name: &str) -> Result<Vec<ArtistId>, StorageError> {
        let prefix = bucket_prefix(name.as_bytes());
        let values = self.scan_index(&self.inner.artists_by_name, &prefix)?;
        Ok(values
            .iter()
            .filter_map(|v| id_from_be(v))
            .map(ArtistId)
            .collect())
    }

    // === Releases ===

    /// Write a release and reconcile its artist/role join rows, all inside
    /// one transaction.
    ///
    /// Join rows implied by the current credit list are upserted; join
    /// rows that exist for this release but are no longer implied get
    /// deleted along with their index entries. Master/year index rows for
    /// the release itself are rewritten when those fields changed.
    pub fn put_release_with_roles(&self, release: &Release) -> Result<(), StorageError> {
        let pk = release.id.0.to_be_bytes();
        let value = serde_json::to_vec(release).map_err(|e| ser_err("release", e))?;
        let live_rows = release.artist_role_rows();

        let mut wtxn = self.inner.env.write_txn().map_err(txn_err)?;

        let old: Option<Release> = match self.inner.releases.get(&wtxn, &pk[..]).map_err(txn_err)? {
            Some(bytes) => serde_json::from_slice(bytes).ok(),
            None => None,
        };

        // Pre-state join rows for this release, read before any mutation.
        let existing_ids: Vec<String> = scan_bucket(
            &self.inner.roles_by_release,
            &wtxn,
            &bucket_prefix(&pk),
        )?
        .into_iter()
        .filter_map(|v| String::from_utf8(v).ok())
        .collect();

        if let Some(old) = old {
            if old.master_id != release.master_id {
                if let Some(m) = old.master_id {
                    let idx = index_key(&m.0.to_be_bytes(), &pk);
                    self.inner
                        .releases_by_master
                        .delete(&mut wtxn, &idx)
                        .map_err(txn_err)?;
                }
            }
            if old.year != release.year {
                if let Some(y) = old.year {
                    let idx = index_key(&y.to_be_bytes(), &pk);
                    self.inner
                        .releases_by_year
                        .delete(&mut wtxn, &idx)
                        .map_err(txn_err)?;
                }
            }
        }

        self.inner
            .releases
            .put(&mut wtxn, &pk[..], &value)
            .map_err(txn_err)?;
        if let Some(m) = release.master_id {
            let idx = index_key(&m.0.to_be_bytes(), &pk);
            self.inner
                .releases_by_master
                .put(&mut wtxn, &idx, &pk[..])
                .map_err(txn_err)?;
        }
        if let Some(y) = release.year {
            let idx = index_key(&y.to_be_bytes(), &pk);
            self.inner
                .releases_by_year
                .put(&mut wtxn, &idx, &pk[..])
                .map_err(txn_err)?;
        }

        let live_ids: HashSet<&str> = live_rows.iter().map(|r| r.id.as_str()).collect();

        for row in &live_rows {
            let row_bytes = serde_json::to_vec(row).map_err(|e| ser_err("artist role", e))?;
            let id_bytes = row.id.as_str().as_bytes();
            self.inner
                .artist_roles
                .put(&mut wtxn, row.id.as_str(), &row_bytes)
                .map_err(txn_err)?;
            self.inner
                .roles_by_artist
                .put(
                    &mut wtxn,
                    &index_key(&row.artist_id.0.to_be_bytes(), id_bytes),
                    id_bytes,
                )
                .map_err(txn_err)?;
            self.inner
                .roles_by_release
                .put(&mut wtxn, &index_key(&pk, id_bytes), id_bytes)
                .map_err(txn_err)?;
            self.inner
                .roles_by_role
                .put(
                    &mut wtxn,
                    &index_key(row.role.as_bytes(), id_bytes),
                    id_bytes,
                )
                .map_err(txn_err)?;
        }

        for stale_id in existing_ids.iter().filter(|id| !live_ids.contains(id.as_str())) {
            let stale_bytes = stale_id.as_bytes();
            let old_row: Option<ArtistRole> = match self
                .inner
                .artist_roles
                .get(&wtxn, stale_id)
                .map_err(txn_err)?
            {
                Some(bytes) => serde_json::from_slice(bytes).ok(),
                None => None,
            };
            if let Some(row) = old_row {
                self.inner
                    .roles_by_artist
                    .delete(
                        &mut wtxn,
                        &index_key(&row.artist_id.0.to_be_bytes(), stale_bytes),
                    )
                    .map_err(txn_err)?;
                self.inner
                    .roles_by_role
                    .delete(&mut wtxn, &index_key(row.role.as_bytes(), stale_bytes))
                    .map_err(txn_err)?;
            }
            self.inner
                .roles_by_release
                .delete(&mut wtxn, &index_key(&pk, stale_bytes))
                .map_err(txn_err)?;
            self.inner
                .artist_roles
                .delete(&mut wtxn, stale_id)
                .map_err(txn_err)?;
        }

        wtxn.commit().map_err(txn_err)
    }

    pub fn get_release(&self, id: ReleaseId) -> Result<Option<Release>, StorageError> {
        let pk = id.0.to_be_bytes();
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        match self.inner.releases.get(&rtxn, &pk[..]).map_err(txn_err)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(bytes).map_err(|e| de_err("release", e))?,
            )),
            None => Ok(None),
        }
    }

    /// Every persisted release id, for bulk warm-up.
    pub fn release_ids(&self) -> Result<Vec<ReleaseId>, StorageError> {
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        let mut ids = Vec::new();
        let iter = self.inner.releases.iter(&rtxn).map_err(txn_err)?;
        for result in iter {
            let (key, _) = result.map_err(txn_err)?;
            if let Some(id) = id_from_be(key) {
                ids.push(ReleaseId(id));
            }
        }
        Ok(ids)
    }

    pub fn release_ids_by_master(&self, master: MasterId) -> Result<Vec<ReleaseId>, StorageError> {
        let prefix = bucket_prefix(&master.0.to_be_bytes());
        let values = self.scan_index(&self.inner.releases_by_master, &prefix)?;
        Ok(values
            .iter()
            .filter_map(|v| id_from_be(v))
            .map(ReleaseId)
            .collect())
    }

    pub fn release_ids_by_year(&self, year: i32) -> Result<Vec<ReleaseId>, StorageError> {
        let prefix = bucket_prefix(&year.to_be_bytes());
        let values = self.scan_index(&self.inner.releases_by_year, &prefix)?;
        Ok(values
            .iter()
            .filter_map(|v| id_from_be(v))
            .map(ReleaseId)
            .collect())
    }

    // === Artist/role join rows ===

    pub fn roles_for_artist(&self, id: ArtistId) -> Result<Vec<ArtistRole>, StorageError> {
        let prefix = bucket_prefix(&id.0.to_be_bytes());
        let ids = self.scan_index(&self.inner.roles_by_artist, &prefix)?;
        self.fetch_roles(ids)
    }

    pub fn roles_for_release(&self, id: ReleaseId) -> Result<Vec<ArtistRole>, StorageError> {
        let prefix = bucket_prefix(&id.0.to_be_bytes());
        let ids = self.scan_index(&self.inner.roles_by_release, &prefix)?;
        self.fetch_roles(ids)
    }

    pub fn roles_with_role(&self, role: &str) -> Result<Vec<ArtistRole>, StorageError> {
        let prefix = bucket_prefix(role.as_bytes());
        let ids = self.scan_index(&self.inner.roles_by_role, &prefix)?;
        self.fetch_roles(ids)
    }

    fn fetch_roles(&self, id_values: Vec<Vec<u8>>) -> Result<Vec<ArtistRole>, StorageError> {
        let rtxn = self.inner.env.read_txn().map_err(txn_err)?;
        let mut rows = Vec::with_capacity(id_values.len());
        for value in id_values {
            let Ok(id) = std::str::from_utf8(&value) else {
                continue;
            };
            if let Some(bytes) = self.inner.artist_roles.get(&rtxn, id).map_err(txn_err)? {
                rows.push(serde_json::from_slice(bytes).map_err(|e| de_err("artist role", e))?);
            }
        }
        Ok(rows)
    }
}
