//! In-memory NOR flash for key backup tests.
//!
//! Programming can only clear bits, so a region must be erased before it is
//! written. Erases and programs land in a working copy; only `sync` makes
//! them durable, and [`MemoryFlash::power_cycle`] throws away anything that
//! was not synced.

use stsafe_core::{KeyStorage, StorageError, StorageOp, storage::ERASED_BYTE};

/// Simulated flash device.
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    working: Vec<u8>,
    durable: Vec<u8>,
    fail_next: Option<StorageOp>,
    ops: Vec<StorageOp>,
}

impl MemoryFlash {
    /// Fully erased device of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            working: vec![ERASED_BYTE; size],
            durable: vec![ERASED_BYTE; size],
            fail_next: None,
            ops: Vec::new(),
        }
    }

    /// Fail the next `op` with a device error.
    pub fn fail_next(&mut self, op: StorageOp) {
        self.fail_next = Some(op);
    }

    /// Drop unsynced changes, as after losing power.
    pub fn power_cycle(&mut self) {
        self.working.clone_from(&self.durable);
    }

    /// Contents as a reader would see them now.
    pub fn contents(&self) -> &[u8] {
        &self.working
    }

    /// Operations attempted so far, including failed ones.
    pub fn ops(&self) -> &[StorageOp] {
        &self.ops
    }

    fn begin(&mut self, op: StorageOp) -> Result<(), StorageError> {
        self.ops.push(op);
        if self.fail_next == Some(op) {
            self.fail_next = None;
            return Err(StorageError::Device(format!("injected {op} failure")));
        }
        Ok(())
    }

    fn range(&self, offset: u32, len: usize) -> Result<std::ops::Range<usize>, StorageError> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.working.len() => Ok(start..end),
            _ => Err(StorageError::OutOfBounds { offset, len: len as u32, size: self.size() }),
        }
    }
}

impl KeyStorage for MemoryFlash {
    fn size(&self) -> u32 {
        self.working.len() as u32
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        self.begin(StorageOp::Read)?;
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.working[range]);
        Ok(())
    }

    fn erase(&mut self, offset: u32, len: u32) -> Result<(), StorageError> {
        self.begin(StorageOp::Erase)?;
        let range = self.range(offset, len as usize)?;
        self.working[range].fill(ERASED_BYTE);
        Ok(())
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        self.begin(StorageOp::Program)?;
        let range = self.range(offset, data.len())?;
        for (cell, byte) in self.working[range].iter_mut().zip(data) {
            *cell &= byte;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.begin(StorageOp::Sync)?;
        self.durable.clone_from(&self.working);
        Ok(())
    }
}
