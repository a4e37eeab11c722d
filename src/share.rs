// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;

use parking_lot::RwLock;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tracing::info;

const ID_LENGTH: usize = 10;

/// A shared pattern. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    pub id: String,
    pub owner_user_id: String,
    pub code: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShareError {
    #[error("invalid share: {0}")]
    Validation(String),
}

/// Creates and resolves references to shared patterns. Persistence belongs to the implementor.
pub trait ShareGateway: Send + Sync {
    /// Stores the pattern and returns the new record. Empty code is rejected.
    fn create(
        &self,
        owner_user_id: &str,
        code: &str,
        title: Option<&str>,
    ) -> Result<ShareRecord, ShareError>;

    /// Looks up a record by its exact id. A missing record is not an error.
    fn get(&self, id: &str) -> Option<ShareRecord>;
}

/// Builds the user facing URL for a share.
pub fn share_url(origin: &str, id: &str) -> String {
    format!("{}/share/{}", origin.trim_end_matches('/'), id)
}

/// Checks that the pattern can be shared.
pub fn validate_code(code: &str) -> Result<(), ShareError> {
    if code.trim().is_empty() {
        return Err(ShareError::Validation("code is required".to_string()));
    }
    Ok(())
}

/// An in-process share store. Records live as long as the store.
#[derive(Default)]
pub struct MemoryShareStore {
    records: RwLock<HashMap<String, ShareRecord>>,
}

impl MemoryShareStore {
    pub fn new() -> MemoryShareStore {
        MemoryShareStore::default()
    }

    fn generate_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ID_LENGTH)
            .map(char::from)
            .collect()
    }
}

impl ShareGateway for MemoryShareStore {
    fn create(
        &self,
        owner_user_id: &str,
        code: &str,
        title: Option<&str>,
    ) -> Result<ShareRecord, ShareError> {
        validate_code(code)?;

        let mut records = self.records.write();
        let mut id = MemoryShareStore::generate_id();
        while records.contains_key(&id) {
            id = MemoryShareStore::generate_id();
        }

        let record = ShareRecord {
            id: id.clone(),
            owner_user_id: owner_user_id.to_string(),
            code: code.to_string(),
            title: title.map(str::to_string),
        };
        records.insert(id, record.clone());

        info!(
            id = record.id,
            owner = record.owner_user_id,
            "Created share."
        );
        Ok(record)
    }

    fn get(&self, id: &str) -> Option<ShareRecord> {
        self.records.read().get(id).cloned()
    }
}
