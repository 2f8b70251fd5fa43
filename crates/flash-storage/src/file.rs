use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::util::checked_range;
use crate::{FlashDevice, FlashError, Result, FILL_BYTE};

// Padding is written in bounded pieces so huge images don't need a capacity-sized buffer.
const PAD_CHUNK: usize = 64 * 1024;

/// Flash device stored in a regular file of exactly `capacity` bytes.
///
/// The file is created (and padded with [`FILL_BYTE`]) by [`FlashDevice::open`]; until then
/// every I/O operation fails with the error kind of that operation.
#[derive(Debug)]
pub struct FileFlash {
    path: PathBuf,
    capacity: u64,
    file: Option<File>,
}

impl FileFlash {
    pub fn new(path: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            path: path.into(),
            capacity,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn prepare(&self) -> io::Result<File> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        let len = file.metadata()?.len();
        if len > self.capacity {
            tracing::debug!(
                path = %self.path.display(),
                len,
                capacity = self.capacity,
                "truncating oversized flash image"
            );
            file.set_len(self.capacity)?;
        } else if len < self.capacity {
            tracing::debug!(
                path = %self.path.display(),
                len,
                capacity = self.capacity,
                "padding flash image with erased bytes"
            );
            write_fill(&mut file, len, self.capacity - len)?;
            file.flush()?;
        }
        Ok(file)
    }
}

fn write_fill(file: &mut File, offset: u64, len: u64) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    let fill = vec![FILL_BYTE; usize::try_from(len).unwrap_or(usize::MAX).min(PAD_CHUNK)];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(fill.len() as u64);
        file.write_all(&fill[..n as usize])?;
        remaining -= n;
    }
    Ok(())
}

fn read_exact_at(file: &mut File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

fn write_all_at(file: &mut File, offset: u64, data: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)
}

impl FlashDevice for FileFlash {
    fn open(&mut self, path: Option<&Path>) -> Result<()> {
        if let Some(path) = path {
            self.path = path.to_path_buf();
        }
        let file = self
            .prepare()
            .map_err(|e| FlashError::Open(format!("{}: {e}", self.path.display())))?;
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        if let Err(e) = file.flush().and_then(|()| file.sync_all()) {
            tracing::warn!(path = %self.path.display(), error = %e, "flush on close failed");
            return Err(FlashError::Close(e.to_string()));
        }
        Ok(())
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let capacity = self.capacity;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| FlashError::Read("device is not open".into()))?;
        checked_range(offset, buf.len() as u64, capacity)?;
        read_exact_at(file, offset, buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                FlashError::Read(format!("short read at offset {offset}"))
            }
            _ => FlashError::Read(e.to_string()),
        })
    }

    fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        let capacity = self.capacity;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| FlashError::Write("device is not open".into()))?;
        checked_range(offset, data.len() as u64, capacity)?;
        write_all_at(file, offset, data).map_err(|e| FlashError::Write(e.to_string()))
    }

    fn erase(&mut self, offset: u64, len: u64) -> Result<()> {
        let capacity = self.capacity;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| FlashError::Erase("device is not open".into()))?;
        checked_range(offset, len, capacity)?;
        if len == 0 {
            return Ok(());
        }
        write_fill(file, offset, len).map_err(|e| FlashError::Erase(e.to_string()))
    }

    fn size(&self) -> u64 {
        self.capacity
    }

    fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if self.file.is_none() {
            return Err(FlashError::Read("device is not open".into()));
        }
        checked_range(offset, len as u64, self.capacity)?;
        let mut buf = vec![FILL_BYTE; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }
}

impl Drop for FileFlash {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
