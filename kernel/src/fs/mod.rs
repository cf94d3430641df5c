//! Virtual File System core
//!
//! This module presents a single hierarchical namespace to the rest of the
//! kernel while delegating storage to pluggable filesystem backends. The
//! pieces:
//!
//! - [`path::VfsPath`]: path values split into name segments
//! - [`FileSystemOperations`]: the contract every backend implements
//! - [`FileSystemDriver`]: backend factories, registered per filesystem type
//! - [`mount::MountTable`]: live mounts with longest-prefix dispatch
//! - [`vfs::VfsManager`]: the syscall-facing façade
//! - [`abi`]: the on-wire directory/mount listing layouts user space parses
//!
//! Inside the crate every fallible operation returns
//! `Result<T, FileSystemError>`; the façade flattens that into the signed
//! status word the syscall layer expects (non-negative on success, the
//! additive inverse of the error code on failure).

pub mod abi;
pub mod drivers;
pub mod mount;
pub mod path;
pub mod vfs;

#[cfg(test)]
mod tests;

pub use mount::{MountEntry, MountTable};
pub use path::VfsPath;
pub use vfs::VfsManager;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

/// Error kinds surfaced by the VFS and its backends.
///
/// The discriminants are the wire codes: the façade returns the additive
/// inverse of `code()` to the caller, so the values are ABI and must not be
/// reordered. Backend-originated kinds pass through the façade unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum FileSystemErrorKind {
    InvalidFileDescriptor = 1,
    InvalidFilePath = 2,
    InvalidFileSystem = 3,
    AlreadyMounted = 4,
    NotExists = 5,
    BufferSmall = 6,
    NotDirectory = 7,
    IsDirectory = 8,
    AlreadyExists = 9,
    NoSpace = 10,
    ReadOnly = 11,
    IoError = 12,
    NotSupported = 13,
    DirectoryNotEmpty = 14,
    InvalidData = 15,
}

impl FileSystemErrorKind {
    /// The positive wire code for this kind.
    pub fn code(self) -> i64 {
        self as i64
    }
}

/// An error from the VFS or a filesystem backend.
#[derive(Clone)]
pub struct FileSystemError {
    pub kind: FileSystemErrorKind,
    pub message: String,
}

impl FileSystemError {
    pub fn new(kind: FileSystemErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Debug for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FileSystemError {{ kind: {:?}, message: {} }}",
            self.kind, self.message
        )
    }
}

bitflags::bitflags! {
    /// Flags accepted by [`vfs::VfsManager::open`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: usize {
        /// Create the file if it does not exist.
        const CREATE = 1 << 0;
    }
}

bitflags::bitflags! {
    /// File attribute bits reported through [`StatInfo`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatFlags: u64 {
        const DIRECTORY = 1 << 0;
        const SYSTEM = 1 << 1;
        const HIDDEN = 1 << 2;
    }
}

impl Default for StatFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Metadata a backend reports for one file.
///
/// `name` is only meaningful in directory listings; lookups by path leave it
/// set to the file's own name for uniformity.
#[derive(Debug, Clone, Default)]
pub struct FileMetadata {
    pub name: String,
    pub size: usize,
    pub directory: bool,
    pub system: bool,
    pub hidden: bool,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
}

/// The record filled by `stat`, as user space sees it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatInfo {
    pub size: u64,
    pub flags: StatFlags,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
}

/// Filesystem-wide statistics filled by `statfs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFsInfo {
    pub total_size: u64,
    pub free_size: u64,
}

/// The filesystem variants the mount layer knows how to name.
///
/// The discriminants are the values the syscall boundary passes for mount
/// requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(usize)]
pub enum FileSystemType {
    Fat32 = 1,
    Sysfs = 2,
    Devfs = 3,
    Procfs = 4,
    Unknown = 5,
}

impl FileSystemType {
    /// Decode the raw value from the syscall boundary.
    pub fn from_raw(value: usize) -> Self {
        match value {
            1 => Self::Fat32,
            2 => Self::Sysfs,
            3 => Self::Devfs,
            4 => Self::Procfs,
            _ => Self::Unknown,
        }
    }

    /// The textual form used in mount listings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fat32 => "FAT32",
            Self::Sysfs => "sysfs",
            Self::Devfs => "devfs",
            Self::Procfs => "procfs",
            Self::Unknown => "Unknown",
        }
    }
}

/// The capability set every filesystem backend implements.
///
/// All paths are backend-local: the mount prefix has already been stripped
/// by the façade, and an empty path denotes the mount's own root directory.
/// Backends are synchronous and use interior mutability; the façade only
/// ever holds shared references to them.
pub trait FileSystemOperations: Send + Sync {
    /// Finish initialization. Called exactly once per mount, after the
    /// mount has been registered.
    fn init(&self) -> Result<(), FileSystemError> {
        Ok(())
    }

    /// Filesystem-wide statistics.
    fn statfs(&self) -> Result<StatFsInfo, FileSystemError>;

    /// Look up a file or directory. Fails with `NotExists` when absent.
    fn get_file(&self, path: &VfsPath) -> Result<FileMetadata, FileSystemError>;

    /// Create an empty file.
    fn touch(&self, path: &VfsPath) -> Result<(), FileSystemError>;

    /// Create a directory.
    fn mkdir(&self, path: &VfsPath) -> Result<(), FileSystemError>;

    /// Remove a file or directory.
    fn rm(&self, path: &VfsPath) -> Result<(), FileSystemError>;

    /// Read into `buffer` starting at `offset`, returning the byte count.
    /// A short read at end of file is success.
    fn read(
        &self,
        path: &VfsPath,
        buffer: &mut [u8],
        offset: usize,
    ) -> Result<usize, FileSystemError>;

    /// Write `buffer` at `offset`, growing the file as needed. Returns the
    /// byte count written.
    fn write(
        &self,
        path: &VfsPath,
        buffer: &[u8],
        offset: usize,
    ) -> Result<usize, FileSystemError>;

    /// Zero-fill `count` bytes at `offset`, growing the file as needed.
    /// Returns the byte count zeroed.
    fn clear(
        &self,
        path: &VfsPath,
        count: usize,
        offset: usize,
    ) -> Result<usize, FileSystemError>;

    /// Extend or shrink the file to exactly `size` bytes.
    fn truncate(&self, path: &VfsPath, size: usize) -> Result<(), FileSystemError>;

    /// List a directory. The order of the result is defined by the backend.
    fn ls(&self, path: &VfsPath) -> Result<Vec<FileMetadata>, FileSystemError>;
}

/// Factory for filesystem backends, registered with the [`VfsManager`].
///
/// The concrete FAT32 and synthetic-tree drivers live outside this crate and
/// register themselves at boot; the in-tree [`drivers::memfs`] driver covers
/// RAM-only configurations and the test suite.
pub trait FileSystemDriver: Send + Sync {
    /// The mount-table variant this driver provides.
    fn fs_type(&self) -> FileSystemType;

    /// Construct a backend instance for a mount of `device` at
    /// `mount_point`. The instance is not initialized yet; `init()` runs
    /// after the mount is registered.
    fn create(
        &self,
        mount_point: &str,
        device: &str,
    ) -> Result<Arc<dyn FileSystemOperations>, FileSystemError>;
}
