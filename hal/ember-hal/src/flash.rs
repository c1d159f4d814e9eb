//! Flash storage abstractions
//!
//! Provides a blocking key/value store for the controller's persistent
//! records. Writes have erase-then-write semantics: a record is replaced
//! as a whole, never patched in place.

use heapless::Vec;

/// Storage keys for persistent records
///
/// These keys identify the different records kept in flash. The actual
/// storage implementation handles wear leveling and data integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StorageKey {
    /// Run-time counters and calibration (binary postcard format)
    Counters = 0,
    /// Error log records (binary postcard format)
    ErrorLog = 1,
    /// Replacement sequence table (binary postcard format)
    SequenceTable = 2,
}

impl StorageKey {
    /// Number of distinct keys
    pub const COUNT: usize = 3;

    /// Get the key as a byte value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create a key from a byte value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(StorageKey::Counters),
            1 => Some(StorageKey::ErrorLog),
            2 => Some(StorageKey::SequenceTable),
            _ => None,
        }
    }
}

/// Errors from flash storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Key not found
    NotFound,
    /// Buffer too small for the data
    BufferTooSmall,
    /// Data corrupted or invalid
    Corrupted,
    /// Storage operation failed
    Storage,
}

/// Flash storage trait
///
/// Implementations should handle:
/// - Wear leveling across flash sectors
/// - Data integrity (CRC or similar)
/// - Atomic replacement of a record
pub trait FlashStorage {
    /// Read a record into the provided buffer
    ///
    /// # Returns
    /// The number of bytes read, or an error.
    fn read(&mut self, key: StorageKey, buffer: &mut [u8]) -> Result<usize, FlashError>;

    /// Replace a record
    fn write(&mut self, key: StorageKey, data: &[u8]) -> Result<(), FlashError>;

    /// Remove a record (reads afterwards report [`FlashError::NotFound`])
    fn erase(&mut self, key: StorageKey) -> Result<(), FlashError>;
}

/// RAM-backed storage for host builds and tests
///
/// Each key holds at most `CAP` bytes.
#[derive(Debug)]
pub struct RamStorage<const CAP: usize> {
    records: [Option<Vec<u8, CAP>>; StorageKey::COUNT],
    writes: u32,
}

impl<const CAP: usize> RamStorage<CAP> {
    /// Create empty storage
    pub const fn new() -> Self {
        Self {
            records: [None, None, None],
            writes: 0,
        }
    }

    /// Number of successful writes and erases so far
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Whether a record exists for `key`
    pub fn contains(&self, key: StorageKey) -> bool {
        self.records[key.as_u8() as usize].is_some()
    }
}

impl<const CAP: usize> Default for RamStorage<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> FlashStorage for RamStorage<CAP> {
    fn read(&mut self, key: StorageKey, buffer: &mut [u8]) -> Result<usize, FlashError> {
        let record = self.records[key.as_u8() as usize]
            .as_ref()
            .ok_or(FlashError::NotFound)?;
        let len = record.len();
        if buffer.len() < len {
            return Err(FlashError::BufferTooSmall);
        }
        buffer[..len].copy_from_slice(record);
        Ok(len)
    }

    fn write(&mut self, key: StorageKey, data: &[u8]) -> Result<(), FlashError> {
        let record = Vec::from_slice(data).map_err(|_| FlashError::BufferTooSmall)?;
        self.records[key.as_u8() as usize] = Some(record);
        self.writes += 1;
        Ok(())
    }

    fn erase(&mut self, key: StorageKey) -> Result<(), FlashError> {
        self.records[key.as_u8() as usize] = None;
        self.writes += 1;
        Ok(())
    }
}

// Implement the sequential-storage Key trait when the feature is enabled
#[cfg(feature = "sequential-storage")]
impl sequential_storage::map::Key for StorageKey {
    fn serialize_into(
        &self,
        buffer: &mut [u8],
    ) -> Result<usize, sequential_storage::map::SerializationError> {
        if buffer.is_empty() {
            return Err(sequential_storage::map::SerializationError::BufferTooSmall);
        }
        buffer[0] = self.as_u8();
        Ok(1)
    }

    fn deserialize_from(
        buffer: &[u8],
    ) -> Result<(Self, usize), sequential_storage::map::SerializationError> {
        if buffer.is_empty() {
            return Err(sequential_storage::map::SerializationError::BufferTooSmall);
        }
        match StorageKey::from_u8(buffer[0]) {
            Some(key) => Ok((key, 1)),
            None => Err(sequential_storage::map::SerializationError::InvalidFormat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for key in [StorageKey::Counters, StorageKey::ErrorLog, StorageKey::SequenceTable] {
            assert_eq!(StorageKey::from_u8(key.as_u8()), Some(key));
        }
        assert_eq!(StorageKey::from_u8(7), None);
    }

    #[test]
    fn test_ram_storage_replace() {
        let mut storage = RamStorage::<16>::new();
        let mut buf = [0u8; 16];

        assert_eq!(storage.read(StorageKey::Counters, &mut buf), Err(FlashError::NotFound));

        storage.write(StorageKey::Counters, &[1, 2, 3]).unwrap();
        storage.write(StorageKey::Counters, &[9]).unwrap();
        assert_eq!(storage.read(StorageKey::Counters, &mut buf), Ok(1));
        assert_eq!(buf[0], 9);
        assert_eq!(storage.writes(), 2);
    }

    #[test]
    fn test_ram_storage_erase() {
        let mut storage = RamStorage::<16>::new();
        storage.write(StorageKey::ErrorLog, &[1]).unwrap();
        storage.erase(StorageKey::ErrorLog).unwrap();
        assert!(!storage.contains(StorageKey::ErrorLog));
    }

    #[test]
    fn test_ram_storage_limits() {
        let mut storage = RamStorage::<2>::new();
        assert_eq!(
            storage.write(StorageKey::Counters, &[1, 2, 3]),
            Err(FlashError::BufferTooSmall)
        );

        storage.write(StorageKey::Counters, &[1, 2]).unwrap();
        let mut small = [0u8; 1];
        assert_eq!(
            storage.read(StorageKey::Counters, &mut small),
            Err(FlashError::BufferTooSmall)
        );
    }
}
