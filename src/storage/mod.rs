//! Byte-block persistent store for counters and user settings.
//!
//! Every value lives under a fixed [`StoreKey`]; new keys are only ever
//! appended so a store written by an older build keeps its values.

pub mod file;
pub mod memory;

use byteorder::{ByteOrder, LittleEndian};
use strum::Display;
use thiserror::Error;
use tracing::warn;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value for {key} is {len} bytes, expected {expected}")]
    Corrupt {
        key: StoreKey,
        len: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StoreKey {
    VoltsUpper,
    VoltsLower,
    AbsorbVolts,
    FloatVolts,
    InverterControl,
    BankSize,
    MinCharge,
    NominalVoltage,
    VoltageOffset,
    Shunt,
    Poles,
    IdleCurrent,
    SelfDischargeDays,
    Charge,
    SelfLeakTime,
    IdleTotal,
    MaxCharge,
    DischargeCycles,
    MaxDischarge,
}

pub trait PersistentStore {
    fn read(&self, key: StoreKey) -> Result<Option<Vec<u8>>, StoreError>;
    fn write(&mut self, key: StoreKey, bytes: &[u8]) -> Result<(), StoreError>;
}

fn expect_len(key: StoreKey, bytes: &[u8], expected: usize) -> Result<(), StoreError> {
    if bytes.len() != expected {
        return Err(StoreError::Corrupt {
            key,
            len: bytes.len(),
            expected,
        });
    }
    Ok(())
}

/// Typed access on top of the byte blocks
pub trait StoreExt: PersistentStore {
    fn read_i16(&self, key: StoreKey) -> Result<Option<i16>, StoreError> {
        match self.read(key)? {
            Some(bytes) => {
                expect_len(key, &bytes, 2)?;
                Ok(Some(LittleEndian::read_i16(&bytes)))
            }
            None => Ok(None),
        }
    }

    fn write_i16(&mut self, key: StoreKey, value: i16) -> Result<(), StoreError> {
        let mut buf = [0u8; 2];
        LittleEndian::write_i16(&mut buf, value);
        self.write(key, &buf)
    }

    fn read_u32(&self, key: StoreKey) -> Result<Option<u32>, StoreError> {
        match self.read(key)? {
            Some(bytes) => {
                expect_len(key, &bytes, 4)?;
                Ok(Some(LittleEndian::read_u32(&bytes)))
            }
            None => Ok(None),
        }
    }

    fn write_u32(&mut self, key: StoreKey, value: u32) -> Result<(), StoreError> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write(key, &buf)
    }

    fn read_f32(&self, key: StoreKey) -> Result<Option<f32>, StoreError> {
        match self.read(key)? {
            Some(bytes) => {
                expect_len(key, &bytes, 4)?;
                Ok(Some(LittleEndian::read_f32(&bytes)))
            }
            None => Ok(None),
        }
    }

    fn write_f32(&mut self, key: StoreKey, value: f32) -> Result<(), StoreError> {
        let mut buf = [0u8; 4];
        LittleEndian::write_f32(&mut buf, value);
        self.write(key, &buf)
    }

    /// Write from the tick path: a failure is logged and dropped, the value
    /// is written again at the next checkpoint
    fn persist_i16(&mut self, key: StoreKey, value: i16) {
        if let Err(e) = self.write_i16(key, value) {
            warn!(error = %e, %key, value, "failed to persist value");
        }
    }

    fn persist_u32(&mut self, key: StoreKey, value: u32) {
        if let Err(e) = self.write_u32(key, value) {
            warn!(error = %e, %key, value, "failed to persist value");
        }
    }

    /// Read from the tick path: unreadable values count as never written
    fn load_i16(&self, key: StoreKey) -> Option<i16> {
        self.read_i16(key).unwrap_or_else(|e| {
            warn!(error = %e, %key, "failed to load value");
            None
        })
    }

    fn load_u32(&self, key: StoreKey) -> Option<u32> {
        self.read_u32(key).unwrap_or_else(|e| {
            warn!(error = %e, %key, "failed to load value");
            None
        })
    }
}

impl<S: PersistentStore + ?Sized> StoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_round_trip() {
        let mut store = MemoryStore::new();
        store.write_i16(StoreKey::Charge, -1234).unwrap();
        store.write_u32(StoreKey::SelfLeakTime, 1_700_000_000).unwrap();
        store.write_f32(StoreKey::VoltageOffset, 1.02).unwrap();

        assert_eq!(store.read_i16(StoreKey::Charge).unwrap(), Some(-1234));
        assert_eq!(store.read_u32(StoreKey::SelfLeakTime).unwrap(), Some(1_700_000_000));
        assert_eq!(store.read_f32(StoreKey::VoltageOffset).unwrap(), Some(1.02));
        assert_eq!(store.read_i16(StoreKey::IdleTotal).unwrap(), None);
    }

    #[test]
    fn test_wrong_width_is_corrupt() {
        let mut store = MemoryStore::new();
        store.write(StoreKey::Charge, &[1, 2, 3]).unwrap();
        assert!(matches!(
            store.read_i16(StoreKey::Charge),
            Err(StoreError::Corrupt { len: 3, expected: 2, .. })
        ));
        // the tick path treats it as never written
        assert_eq!(store.load_i16(StoreKey::Charge), None);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(StoreKey::SelfLeakTime.to_string(), "self_leak_time");
        assert_eq!(StoreKey::DischargeCycles.to_string(), "discharge_cycles");
    }
}
