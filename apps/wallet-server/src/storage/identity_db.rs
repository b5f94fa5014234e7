// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity Store backed by redb.
//!
//! ## Table Layout
//!
//! - `identities`: subject_id → serialized Identity
//! - `identities_by_pseudo`: pseudonymized id → subject_id
//! - `identity_counters`: `subject_id` → last issued id
//!
//! Subject ids come from a monotonic counter and are never reused.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};

use super::records::{Identity, Provider};
use crate::auth::Role;
use crate::crypto::PseudonymizedId;

const IDENTITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("identities");

const IDENTITIES_BY_PSEUDO: TableDefinition<&str, u64> = TableDefinition::new("identities_by_pseudo");

const IDENTITY_COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("identity_counters");

const SEQ_SUBJECT: &str = "subject_id";

#[derive(Debug, thiserror::Error)]
pub enum IdentityDbError {
    #[error("failed to create identity store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("identity already exists")]
    AlreadyExists,

    #[error("identity task failed: {0}")]
    Task(String),
}

pub type IdentityDbResult<T> = Result<T, IdentityDbError>;

/// Fields for a first-time login.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub pseudonymized_id: PseudonymizedId,
    pub display_name: String,
    pub provider: Provider,
    pub provider_id: String,
    pub avatar_url: Option<String>,
}

/// Storage seam for identities.
pub trait IdentityStore: Send + Sync + 'static {
    fn find_by_pseudo(&self, pseudo: &PseudonymizedId) -> IdentityDbResult<Option<Identity>>;
    fn find_by_subject(&self, subject_id: u64) -> IdentityDbResult<Option<Identity>>;
    /// Create an identity with a fresh subject id and role `USER`.
    fn create(&self, new: NewIdentity) -> IdentityDbResult<Identity>;
    /// Look up the identity for `new.pseudonymized_id` and refresh its
    /// display name and avatar if active, or create it, in one write
    /// transaction. Returns the identity and whether it was created.
    fn find_or_create(&self, new: NewIdentity) -> IdentityDbResult<(Identity, bool)>;
    /// Overwrite the mutable fields (display name, avatar, active).
    fn update(&self, identity: &Identity) -> IdentityDbResult<()>;
}

pub struct IdentityDatabase {
    db: Database,
}

impl IdentityDatabase {
    pub fn open(path: &Path) -> IdentityDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(IDENTITIES)?;
            let _ = write_txn.open_table(IDENTITIES_BY_PSEUDO)?;
            let _ = write_txn.open_table(IDENTITY_COUNTERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

fn lookup_in(write_txn: &WriteTransaction, pseudo: &PseudonymizedId) -> IdentityDbResult<Option<Identity>> {
    let index = write_txn.open_table(IDENTITIES_BY_PSEUDO)?;
    let Some(subject_id) = index.get(pseudo.as_str())?.map(|v| v.value()) else {
        return Ok(None);
    };
    let table = write_txn.open_table(IDENTITIES)?;
    let found = match table.get(subject_id)? {
        Some(value) => Some(serde_json::from_slice(value.value())?),
        None => None,
    };
    Ok(found)
}

fn insert_in(write_txn: &WriteTransaction, new: NewIdentity) -> IdentityDbResult<Identity> {
    let mut counters = write_txn.open_table(IDENTITY_COUNTERS)?;
    let subject_id = counters.get(SEQ_SUBJECT)?.map(|v| v.value()).unwrap_or(0) + 1;
    counters.insert(SEQ_SUBJECT, subject_id)?;

    let now = Utc::now();
    let identity = Identity {
        subject_id,
        pseudonymized_id: new.pseudonymized_id,
        display_name: new.display_name,
        role: Role::User,
        provider: new.provider,
        provider_id: new.provider_id,
        avatar_url: new.avatar_url,
        active: true,
        created_at: now,
        updated_at: now,
    };
    let json = serde_json::to_vec(&identity)?;
    write_txn.open_table(IDENTITIES)?.insert(subject_id, json.as_slice())?;
    write_txn
        .open_table(IDENTITIES_BY_PSEUDO)?
        .insert(identity.pseudonymized_id.as_str(), subject_id)?;
    Ok(identity)
}

impl IdentityStore for IdentityDatabase {
    fn find_by_pseudo(&self, pseudo: &PseudonymizedId) -> IdentityDbResult<Option<Identity>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(IDENTITIES_BY_PSEUDO)?;
        let Some(subject_id) = index.get(pseudo.as_str())?.map(|v| v.value()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(IDENTITIES)?;
        match table.get(subject_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_subject(&self, subject_id: u64) -> IdentityDbResult<Option<Identity>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(IDENTITIES)?;
        match table.get(subject_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn create(&self, new: NewIdentity) -> IdentityDbResult<Identity> {
        let write_txn = self.db.begin_write()?;
        if lookup_in(&write_txn, &new.pseudonymized_id)?.is_some() {
            return Err(IdentityDbError::AlreadyExists);
        }
        let identity = insert_in(&write_txn, new)?;
        write_txn.commit()?;
        Ok(identity)
    }

    fn find_or_create(&self, new: NewIdentity) -> IdentityDbResult<(Identity, bool)> {
        let write_txn = self.db.begin_write()?;
        let outcome = match lookup_in(&write_txn, &new.pseudonymized_id)? {
            Some(mut existing) => {
                if existing.active {
                    existing.display_name = new.display_name;
                    existing.avatar_url = new.avatar_url.or(existing.avatar_url);
                    existing.updated_at = Utc::now();
                    let json = serde_json::to_vec(&existing)?;
                    write_txn
                        .open_table(IDENTITIES)?
                        .insert(existing.subject_id, json.as_slice())?;
                }
                (existing, false)
            }
            None => (insert_in(&write_txn, new)?, true),
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    fn update(&self, identity: &Identity) -> IdentityDbResult<()> {
        let json = serde_json::to_vec(identity)?;
        let write_txn = self.db.begin_write()?;
        write_txn
            .open_table(IDENTITIES)?
            .insert(identity.subject_id, json.as_slice())?;
        write_txn.commit()?;
        Ok(())
    }
}
