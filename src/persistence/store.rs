//! Thin sled wrapper, following the teacher's `state.rs` pattern: values are
//! `serde_json`-encoded under prefixed string keys, with `scan_prefix` doing
//! the listing sled itself doesn't otherwise give us.

use serde::{de::DeserializeOwned, Serialize};
use sled::Db;
use std::path::Path;

use crate::error::CoreResult;

#[derive(Clone)]
pub struct Store {
    db: Db,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        Ok(Self { db: sled::open(path)? })
    }

    pub fn open_temporary() -> CoreResult<Self> {
        Ok(Self { db: sled::Config::new().temporary(true).open()? })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CoreResult<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> CoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> CoreResult<()> {
        self.db.remove(key.as_bytes())?;
        Ok(())
    }

    /// Compare-and-swap on the raw bytes; used by the Gateway to enforce
    /// optimistic concurrency on aggregate rows.
    pub fn cas<T: Serialize>(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &T,
    ) -> CoreResult<bool> {
        let new_bytes = serde_json::to_vec(new)?;
        match self.db.compare_and_swap(key.as_bytes(), expected, Some(new_bytes)) {
            Ok(Ok(())) => Ok(true),
            Ok(Err(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_raw(&self, key: &str) -> CoreResult<Option<sled::IVec>> {
        Ok(self.db.get(key.as_bytes())?)
    }

    pub fn scan_prefix<T: DeserializeOwned>(&self, prefix: &str) -> CoreResult<Vec<T>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    pub fn flush(&self) -> CoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
