//! Persistent records
//!
//! Records are postcard-encoded into a stack buffer and handed to the
//! flash store as a whole. A missing record is reported as
//! [`PersistError::Missing`] so callers can fall back to defaults.

use ember_hal::{FlashError, FlashStorage, StorageKey};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Largest encoded record, bytes
pub const RECORD_MAX: usize = 2560;

/// Errors from loading or saving a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistError {
    /// No record stored under the key
    Missing,
    /// The record does not fit the encode buffer
    Encode,
    /// The stored bytes do not decode
    Decode,
    /// The flash store failed
    Flash(FlashError),
}

impl From<FlashError> for PersistError {
    fn from(e: FlashError) -> Self {
        match e {
            FlashError::NotFound => PersistError::Missing,
            other => PersistError::Flash(other),
        }
    }
}

/// Encode `value` and store it under `key`
pub fn save<S, T>(storage: &mut S, key: StorageKey, value: &T) -> Result<(), PersistError>
where
    S: FlashStorage,
    T: Serialize,
{
    let mut buf = [0u8; RECORD_MAX];
    let used = postcard::to_slice(value, &mut buf).map_err(|_| PersistError::Encode)?;
    storage.write(key, used)?;
    Ok(())
}

/// Load and decode the record under `key`
pub fn load<S, T>(storage: &mut S, key: StorageKey) -> Result<T, PersistError>
where
    S: FlashStorage,
    T: DeserializeOwned,
{
    let mut buf = [0u8; RECORD_MAX];
    let len = storage.read(key, &mut buf)?;
    postcard::from_bytes(&buf[..len]).map_err(|_| PersistError::Decode)
}
