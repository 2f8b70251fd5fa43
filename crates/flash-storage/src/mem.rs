use std::path::Path;

use crate::util::{checked_range, to_index};
use crate::{FlashDevice, FlashError, Result, FILL_BYTE};

/// Fully materialized in-memory flash device.
///
/// Every byte of the address space is backed by the buffer, so this is only suitable for
/// small capacities. It serves as the reference model for the sparse store in tests.
#[derive(Debug, Clone)]
pub struct MemFlash {
    data: Vec<u8>,
}

impl MemFlash {
    pub fn new(capacity: u64) -> Result<Self> {
        let len = usize::try_from(capacity)
            .map_err(|_| FlashError::InvalidConfig("capacity does not fit in memory"))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| FlashError::InvalidConfig("capacity does not fit in memory"))?;
        data.resize(len, FILL_BYTE);
        Ok(Self { data })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl FlashDevice for MemFlash {
    fn open(&mut self, _path: Option<&Path>) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        checked_range(offset, buf.len() as u64, self.size())?;
        let start = to_index(offset)?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        checked_range(offset, data.len() as u64, self.size())?;
        let start = to_index(offset)?;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, offset: u64, len: u64) -> Result<()> {
        checked_range(offset, len, self.size())?;
        let start = to_index(offset)?;
        let end = to_index(offset + len)?;
        self.data[start..end].fill(FILL_BYTE);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_fully_erased() {
        let flash = MemFlash::new(64).unwrap();
        assert_eq!(flash.size(), 64);
        assert!(flash.as_slice().iter().all(|b| *b == FILL_BYTE));
    }

    #[test]
    fn erase_only_touches_requested_range() {
        let mut flash = MemFlash::new(16).unwrap();
        flash.write(&[0u8; 16], 0).unwrap();
        flash.erase(4, 8).unwrap();

        let data = flash.into_vec();
        assert!(data[..4].iter().all(|b| *b == 0));
        assert!(data[4..12].iter().all(|b| *b == FILL_BYTE));
        assert!(data[12..].iter().all(|b| *b == 0));
    }

    #[test]
    fn rejected_write_leaves_contents_unchanged() {
        let mut flash = MemFlash::new(8).unwrap();
        let err = flash.write(&[1, 2, 3], 6).unwrap_err();
        assert!(matches!(err, FlashError::OutOfBounds { .. }));
        assert!(flash.as_slice().iter().all(|b| *b == FILL_BYTE));
    }
}
