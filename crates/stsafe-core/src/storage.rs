//! Persistent storage collaborator and the host key backup layout.
//!
//! Pairing backs the host key pair up outside the element: one 32-byte record
//! (MAC key then cipher key) at a fixed offset. The record is written with the
//! usual flash sequence of erase, program, sync, and each step failing is
//! reported separately so callers can tell them apart.

use thiserror::Error;

use crate::{
    error::StorageOp,
    keys::{HOST_KEY_ATTRIBUTE_LEN, HostKeyPair},
};

/// Value of an erased storage byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Errors raised by the storage device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Access falls outside the device
    #[error("access of {len} bytes at offset {offset} exceeds device size {size}")]
    OutOfBounds {
        /// Start of the access
        offset: u32,
        /// Length of the access
        len: u32,
        /// Device size
        size: u32,
    },

    /// Device-level failure
    #[error("storage device error: {0}")]
    Device(String),
}

/// Block storage primitives used for the key backup.
pub trait KeyStorage {
    /// Device size in bytes.
    fn size(&self) -> u32;

    /// Fill `buf` from `offset`.
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Erase `len` bytes at `offset`.
    fn erase(&mut self, offset: u32, len: u32) -> Result<(), StorageError>;

    /// Program `data` at `offset`. The range must have been erased.
    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError>;

    /// Make previous programs durable.
    fn sync(&mut self) -> Result<(), StorageError>;
}

impl<S: KeyStorage + ?Sized> KeyStorage for &mut S {
    fn size(&self) -> u32 {
        (**self).size()
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read(offset, buf)
    }

    fn erase(&mut self, offset: u32, len: u32) -> Result<(), StorageError> {
        (**self).erase(offset, len)
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        (**self).program(offset, data)
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        (**self).sync()
    }
}

/// Failure of one step of [`KeyBackup::persist`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backup {op} failed: {source}")]
pub struct PersistError {
    /// Step that failed
    pub op: StorageOp,
    /// Device error
    #[source]
    pub source: StorageError,
}

/// Location of the host key backup record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBackup {
    offset: u32,
}

impl KeyBackup {
    /// Record length.
    pub const LEN: u32 = HOST_KEY_ATTRIBUTE_LEN as u32;

    /// Record at `offset`.
    pub fn new(offset: u32) -> Self {
        Self { offset }
    }

    /// Record offset.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Check the record fits on `storage`.
    pub fn check_fits<S: KeyStorage + ?Sized>(&self, storage: &S) -> Result<(), StorageError> {
        let size = storage.size();
        match self.offset.checked_add(Self::LEN) {
            Some(end) if end <= size => Ok(()),
            _ => Err(StorageError::OutOfBounds { offset: self.offset, len: Self::LEN, size }),
        }
    }

    /// Erase, program and sync `keys` into the record.
    pub fn persist<S: KeyStorage + ?Sized>(
        &self,
        storage: &mut S,
        keys: &HostKeyPair,
    ) -> Result<(), PersistError> {
        storage
            .erase(self.offset, Self::LEN)
            .map_err(|source| PersistError { op: StorageOp::Erase, source })?;
        storage
            .program(self.offset, keys.to_attribute().as_slice())
            .map_err(|source| PersistError { op: StorageOp::Program, source })?;
        storage.sync().map_err(|source| PersistError { op: StorageOp::Sync, source })?;
        Ok(())
    }

    /// Erase and sync the record so no older keys survive in it.
    pub fn invalidate<S: KeyStorage + ?Sized>(&self, storage: &mut S) -> Result<(), PersistError> {
        storage
            .erase(self.offset, Self::LEN)
            .map_err(|source| PersistError { op: StorageOp::Erase, source })?;
        storage.sync().map_err(|source| PersistError { op: StorageOp::Sync, source })
    }

    /// Read the record back. `None` when the region is erased.
    pub fn load<S: KeyStorage + ?Sized>(
        &self,
        storage: &mut S,
    ) -> Result<Option<HostKeyPair>, StorageError> {
        let mut record = zeroize::Zeroizing::new([0u8; HOST_KEY_ATTRIBUTE_LEN]);
        storage.read(self.offset, record.as_mut_slice())?;

        if record.iter().all(|&b| b == ERASED_BYTE) {
            return Ok(None);
        }
        Ok(Some(HostKeyPair::from_attribute(&record)))
    }
}
