//! Byte-addressed flash device abstractions.
//!
//! Every backend presents the same fixed-capacity read/write/erase contract, with unwritten
//! and erased bytes reading as [`FILL_BYTE`] (`0xFF`). This crate provides:
//!
//! - [`FlashDevice`]: the device contract shared by all backends
//! - [`MemFlash`]: flat in-memory buffer covering the whole capacity
//! - [`FileFlash`]: regular file preallocated to the device capacity
//! - [`SparseFlash`]: stores only written ranges, as merged chunks in an ordered map
//! - [`FlashConfig`]: serde description used to pick a backend at construction time

mod config;
mod device;
mod error;
mod file;
mod mem;
mod sparse;
mod util;

pub use config::{BackendConfig, FlashConfig};
pub use device::{FlashDevice, FILL_BYTE};
pub use error::{ErrorKind, FlashError, Result};
pub use file::FileFlash;
pub use mem::MemFlash;
pub use sparse::{ErasePolicy, MergePolicy, SparseConfig, SparseFlash};

#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;
