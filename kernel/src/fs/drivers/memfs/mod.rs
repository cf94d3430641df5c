//! Memory filesystem
//!
//! A tree of directories and byte-vector files kept entirely in kernel
//! memory, with an optional byte quota. Directory children live in a
//! `BTreeMap`, so listings come back in name order. Timestamps are drawn
//! from a per-filesystem logical clock that ticks on every mutation; there
//! is no wall clock this deep in the kernel.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::RwLock;

use crate::fs::path::VfsPath;
use crate::fs::{
    FileMetadata, FileSystemDriver, FileSystemError, FileSystemErrorKind, FileSystemOperations,
    FileSystemType, StatFsInfo,
};


/// One node in the tree.
enum MemNode {
    File {
        data: Vec<u8>,
        created: u64,
        modified: u64,
    },
    Directory {
        children: BTreeMap<String, MemNode>,
        created: u64,
        modified: u64,
    },
}

impl MemNode {
    fn new_file(now: u64) -> Self {
        Self::File {
            data: Vec::new(),
            created: now,
            modified: now,
        }
    }

    fn new_directory(now: u64) -> Self {
        Self::Directory {
            children: BTreeMap::new(),
            created: now,
            modified: now,
        }
    }

    fn metadata(&self, name: &str) -> FileMetadata {
        match self {
            Self::File {
                data,
                created,
                modified,
            } => FileMetadata {
                name: name.to_string(),
                size: data.len(),
                directory: false,
                system: false,
                hidden: false,
                created: *created,
                modified: *modified,
                accessed: *modified,
            },
            Self::Directory {
                created, modified, ..
            } => FileMetadata {
                name: name.to_string(),
                size: 0,
                directory: true,
                system: false,
                hidden: false,
                created: *created,
                modified: *modified,
                accessed: *modified,
            },
        }
    }
}

struct MemFsState {
    root: MemNode,
    used: usize,
    clock: u64,
}

impl MemFsState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// The memory filesystem instance mounted under one mount point.
pub struct MemFs {
    state: RwLock<MemFsState>,
    /// Byte quota for file contents; 0 means unlimited.
    quota: usize,
}

impl MemFs {
    pub fn new(quota: usize) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(MemFsState {
                root: MemNode::new_directory(0),
                used: 0,
                clock: 0,
            }),
            quota,
        })
    }

    fn ensure_quota(&self, used: usize, additional: usize) -> Result<(), FileSystemError> {
        if self.quota != 0 && used + additional > self.quota {
            return Err(FileSystemError::new(
                FileSystemErrorKind::NoSpace,
                "memfs quota exceeded",
            ));
        }
        Ok(())
    }
}

/// Walk to the node at `path`. The empty path is the filesystem root.
fn lookup<'a>(root: &'a MemNode, path: &VfsPath) -> Result<&'a MemNode, FileSystemError> {
    let mut node = root;
    for segment in path.iter() {
        let children = match node {
            MemNode::Directory { children, .. } => children,
            MemNode::File { .. } => {
                return Err(not_directory(segment));
            }
        };
        node = children.get(segment).ok_or_else(|| not_exists(segment))?;
    }
    Ok(node)
}

fn lookup_mut<'a>(
    root: &'a mut MemNode,
    path: &VfsPath,
) -> Result<&'a mut MemNode, FileSystemError> {
    let mut node = root;
    for segment in path.iter() {
        let children = match node {
            MemNode::Directory { children, .. } => children,
            MemNode::File { .. } => {
                return Err(not_directory(segment));
            }
        };
        node = children
            .get_mut(segment)
            .ok_or_else(|| not_exists(segment))?;
    }
    Ok(node)
}

/// Walk to the parent directory of `path` and split off the final segment.
fn lookup_parent_mut<'a, 'p>(
    root: &'a mut MemNode,
    path: &'p VfsPath,
) -> Result<(&'a mut BTreeMap<String, MemNode>, &'p str), FileSystemError> {
    let name = match path.last() {
        Some(name) => name,
        None => {
            return Err(FileSystemError::new(
                FileSystemErrorKind::InvalidFilePath,
                "operation needs a non-empty path",
            ));
        }
    };
    let parent = lookup_mut(root, &path.parent())?;
    match parent {
        MemNode::Directory { children, .. } => Ok((children, name)),
        MemNode::File { .. } => Err(not_directory(name)),
    }
}

fn not_exists(segment: &str) -> FileSystemError {
    FileSystemError::new(
        FileSystemErrorKind::NotExists,
        alloc::format!("no such entry: {}", segment),
    )
}

fn not_directory(segment: &str) -> FileSystemError {
    FileSystemError::new(
        FileSystemErrorKind::NotDirectory,
        alloc::format!("not a directory: {}", segment),
    )
}

impl FileSystemOperations for MemFs {
    fn statfs(&self) -> Result<StatFsInfo, FileSystemError> {
        let state = self.state.read();
        if self.quota == 0 {
            return Ok(StatFsInfo {
                total_size: 0,
                free_size: 0,
            });
        }
        Ok(StatFsInfo {
            total_size: self.quota as u64,
            free_size: (self.quota - state.used.min(self.quota)) as u64,
        })
    }

    fn get_file(&self, path: &VfsPath) -> Result<FileMetadata, FileSystemError> {
        let state = self.state.read();
        let node = lookup(&state.root, path)?;
        Ok(node.metadata(path.last().unwrap_or("/")))
    }

    fn touch(&self, path: &VfsPath) -> Result<(), FileSystemError> {
        let mut state = self.state.write();
        let now = state.tick();
        let (children, name) = lookup_parent_mut(&mut state.root, path)?;
        if children.contains_key(name) {
            return Err(FileSystemError::new(
                FileSystemErrorKind::AlreadyExists,
                "file already exists",
            ));
        }
        children.insert(name.to_string(), MemNode::new_file(now));
        Ok(())
    }

    fn mkdir(&self, path: &VfsPath) -> Result<(), FileSystemError> {
        let mut state = self.state.write();
        let now = state.tick();
        let (children, name) = lookup_parent_mut(&mut state.root, path)?;
        if children.contains_key(name) {
            return Err(FileSystemError::new(
                FileSystemErrorKind::AlreadyExists,
                "directory already exists",
            ));
        }
        children.insert(name.to_string(), MemNode::new_directory(now));
        Ok(())
    }

    fn rm(&self, path: &VfsPath) -> Result<(), FileSystemError> {
        let mut state = self.state.write();
        if path.is_empty() {
            return Err(FileSystemError::new(
                FileSystemErrorKind::NotSupported,
                "cannot remove the filesystem root",
            ));
        }

        let (children, name) = lookup_parent_mut(&mut state.root, path)?;
        let freed = match children.get(name) {
            Some(MemNode::Directory {
                children: grandchildren,
                ..
            }) => {
                if !grandchildren.is_empty() {
                    return Err(FileSystemError::new(
                        FileSystemErrorKind::DirectoryNotEmpty,
                        "directory is not empty",
                    ));
                }
                0
            }
            Some(MemNode::File { data, .. }) => data.len(),
            None => return Err(not_exists(name)),
        };
        children.remove(name);
        state.used -= freed;
        Ok(())
    }

    fn read(
        &self,
        path: &VfsPath,
        buffer: &mut [u8],
        offset: usize,
    ) -> Result<usize, FileSystemError> {
        let state = self.state.read();
        let data = match lookup(&state.root, path)? {
            MemNode::File { data, .. } => data,
            MemNode::Directory { .. } => {
                return Err(FileSystemError::new(
                    FileSystemErrorKind::IsDirectory,
                    "cannot read a directory",
                ));
            }
        };

        // Reads past the end are short, not an error.
        if offset >= data.len() {
            return Ok(0);
        }
        let count = buffer.len().min(data.len() - offset);
        buffer[..count].copy_from_slice(&data[offset..offset + count]);
        Ok(count)
    }

    fn write(
        &self,
        path: &VfsPath,
        buffer: &[u8],
        offset: usize,
    ) -> Result<usize, FileSystemError> {
        let mut state = self.state.write();
        let used = state.used;
        let now = state.tick();
        let quota = |additional| self.ensure_quota(used, additional);

        let (data, modified) = match lookup_mut(&mut state.root, path)? {
            MemNode::File { data, modified, .. } => (data, modified),
            MemNode::Directory { .. } => {
                return Err(FileSystemError::new(
                    FileSystemErrorKind::IsDirectory,
                    "cannot write a directory",
                ));
            }
        };

        let end = offset + buffer.len();
        let grown = end.saturating_sub(data.len());
        quota(grown)?;
        if end > data.len() {
            // Zero-fill any gap between the old end and the write offset.
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buffer);
        *modified = now;
        state.used += grown;
        Ok(buffer.len())
    }

    fn clear(
        &self,
        path: &VfsPath,
        count: usize,
        offset: usize,
    ) -> Result<usize, FileSystemError> {
        let mut state = self.state.write();
        let used = state.used;
        let now = state.tick();
        let quota = |additional| self.ensure_quota(used, additional);

        let (data, modified) = match lookup_mut(&mut state.root, path)? {
            MemNode::File { data, modified, .. } => (data, modified),
            MemNode::Directory { .. } => {
                return Err(FileSystemError::new(
                    FileSystemErrorKind::IsDirectory,
                    "cannot clear a directory",
                ));
            }
        };

        let end = offset + count;
        let grown = end.saturating_sub(data.len());
        quota(grown)?;
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].fill(0);
        *modified = now;
        state.used += grown;
        Ok(count)
    }

    fn truncate(&self, path: &VfsPath, size: usize) -> Result<(), FileSystemError> {
        let mut state = self.state.write();
        let used = state.used;
        let now = state.tick();
        let quota = |additional| self.ensure_quota(used, additional);

        let (data, modified) = match lookup_mut(&mut state.root, path)? {
            MemNode::File { data, modified, .. } => (data, modified),
            MemNode::Directory { .. } => {
                return Err(FileSystemError::new(
                    FileSystemErrorKind::IsDirectory,
                    "cannot truncate a directory",
                ));
            }
        };

        let old_len = data.len();
        if size > old_len {
            quota(size - old_len)?;
        }
        data.resize(size, 0);
        *modified = now;
        if size >= old_len {
            state.used += size - old_len;
        } else {
            state.used -= old_len - size;
        }
        Ok(())
    }

    fn ls(&self, path: &VfsPath) -> Result<Vec<FileMetadata>, FileSystemError> {
        let state = self.state.read();
        let children = match lookup(&state.root, path)? {
            MemNode::Directory { children, .. } => children,
            MemNode::File { .. } => {
                return Err(FileSystemError::new(
                    FileSystemErrorKind::NotDirectory,
                    "cannot list a regular file",
                ));
            }
        };
        Ok(children
            .iter()
            .map(|(name, node)| node.metadata(name))
            .collect())
    }
}

/// Driver exposing [`MemFs`] under a chosen mount-table variant.
///
/// The boot layout names FAT32 and the three synthetic filesystems; on
/// RAM-only targets (and in tests) a `MemFsDriver` can stand in for any of
/// them.
pub struct MemFsDriver {
    fs_type: FileSystemType,
    quota: usize,
}

impl MemFsDriver {
    pub fn new(fs_type: FileSystemType) -> Self {
        Self { fs_type, quota: 0 }
    }

    pub fn with_quota(fs_type: FileSystemType, quota: usize) -> Self {
        Self { fs_type, quota }
    }
}

impl FileSystemDriver for MemFsDriver {
    fn fs_type(&self) -> FileSystemType {
        self.fs_type
    }

    fn create(
        &self,
        _mount_point: &str,
        _device: &str,
    ) -> Result<Arc<dyn FileSystemOperations>, FileSystemError> {
        Ok(MemFs::new(self.quota))
    }
}
