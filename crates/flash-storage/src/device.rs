use std::path::Path;

use crate::Result;

/// Value of every byte that has never been written or has been erased.
pub const FILL_BYTE: u8 = 0xFF;

/// Byte-addressed flash device with a fixed capacity.
///
/// All range checks are strict: a request whose end exceeds [`FlashDevice::size`] fails with
/// [`crate::FlashError::OutOfBounds`] and leaves the device untouched. Zero-length requests
/// are accepted as long as `offset <= size()`.
pub trait FlashDevice {
    /// Prepare the device for use.
    ///
    /// Backends without external resources treat this as a no-op. A file-backed device uses
    /// `path`, when given, in place of the path it was constructed with.
    fn open(&mut self, path: Option<&Path>) -> Result<()>;

    /// Release any resources held by the device.
    ///
    /// The device is closed once this returns, even when an error is reported.
    fn close(&mut self) -> Result<()>;

    /// Fill `buf` with the contents starting at `offset`.
    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Store `data` starting at `offset`.
    fn write(&mut self, data: &[u8], offset: u64) -> Result<()>;

    /// Reset `[offset, offset + len)` to [`FILL_BYTE`].
    fn erase(&mut self, offset: u64, len: u64) -> Result<()>;

    /// Total capacity in bytes.
    fn size(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        crate::util::checked_range(offset, len as u64, self.size())?;
        let mut buf = vec![FILL_BYTE; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }
}

impl<T: FlashDevice + ?Sized> FlashDevice for Box<T> {
    fn open(&mut self, path: Option<&Path>) -> Result<()> {
        (**self).open(path)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_into(offset, buf)
    }

    fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        (**self).write(data, offset)
    }

    fn erase(&mut self, offset: u64, len: u64) -> Result<()> {
        (**self).erase(offset, len)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        (**self).read(offset, len)
    }
}

impl<T: FlashDevice + ?Sized> FlashDevice for &mut T {
    fn open(&mut self, path: Option<&Path>) -> Result<()> {
        (**self).open(path)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_into(offset, buf)
    }

    fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        (**self).write(data, offset)
    }

    fn erase(&mut self, offset: u64, len: u64) -> Result<()> {
        (**self).erase(offset, len)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        (**self).read(offset, len)
    }
}
