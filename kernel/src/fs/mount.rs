//! Mount table and path dispatch
//!
//! The mount table is a flat list of live mounts in registration order.
//! Every absolute path is owned by exactly one mount: the one whose segment
//! vector is the longest prefix of the path's segments. Mounts are never
//! removed — there is no unmount in this design — so entries only accumulate.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use super::path::VfsPath;
use super::{FileSystemError, FileSystemOperations, FileSystemType};

/// One live mount.
///
/// `mount_point` is the canonical string form (`/` for the root mount,
/// `/a/b/` with a trailing slash otherwise) and `segments` is derived from
/// it at construction, so the two can never drift apart.
pub struct MountEntry {
    pub fs_type: FileSystemType,
    pub device: String,
    pub mount_point: String,
    pub segments: Vec<String>,
    backend: Arc<dyn FileSystemOperations>,
    initialized: AtomicBool,
}

impl MountEntry {
    pub fn new(
        fs_type: FileSystemType,
        device: impl Into<String>,
        mount_point: impl Into<String>,
        backend: Arc<dyn FileSystemOperations>,
    ) -> Self {
        let mount_point = mount_point.into();
        let segments = VfsPath::parse(&mount_point).segments().to_vec();
        Self {
            fs_type,
            device: device.into(),
            mount_point,
            segments,
            backend,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &dyn FileSystemOperations {
        &*self.backend
    }

    /// True for the mount that owns the global root.
    pub fn is_root_mount(&self) -> bool {
        self.segments.is_empty()
    }

    /// Run the backend's `init()` exactly once for this entry.
    ///
    /// Both the bulk boot-time init and the descriptor-form mount drive this
    /// method; whichever arrives first does the work. A failed init is not
    /// retried.
    pub fn init_backend(&self) -> Result<(), FileSystemError> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.backend.init()
    }

    /// Strip this mount's prefix, leaving the backend-local path. An empty
    /// result denotes the mount's own root directory.
    pub fn backend_local(&self, path: &VfsPath) -> VfsPath {
        path.sub_path(self.segments.len())
    }
}

/// The table of live mounts.
#[derive(Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a mount. Entries keep registration order, which is also the
    /// order mount listings are emitted in.
    pub fn add(&mut self, entry: MountEntry) {
        self.entries.push(entry);
    }

    /// Bit-exact lookup of a canonical mount-point string, used for
    /// duplicate-mount detection.
    pub fn contains(&self, mount_point: &str) -> bool {
        self.entries.iter().any(|e| e.mount_point == mount_point)
    }

    /// Select the mount owning `path`.
    ///
    /// The global root maps to the root mount. Otherwise the winner is the
    /// entry whose `segments` is the longest full prefix of the path's
    /// segments; a mount deeper than the path never matches. When nothing
    /// matches, the root mount wins by default (its empty prefix matches
    /// everything). Returns `None` only while the table is empty.
    pub fn find(&self, path: &VfsPath) -> Option<&MountEntry> {
        if path.is_root() {
            return self.root_mount();
        }

        let mut best: Option<&MountEntry> = None;
        for entry in &self.entries {
            if entry.segments.len() > path.len() {
                continue;
            }
            if !path.segments().starts_with(&entry.segments) {
                continue;
            }
            let better = match best {
                Some(current) => entry.segments.len() > current.segments.len(),
                None => true,
            };
            if better {
                best = Some(entry);
            }
        }

        best.or_else(|| self.root_mount())
    }

    fn root_mount(&self) -> Option<&MountEntry> {
        self.entries.iter().find(|e| e.is_root_mount())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MountEntry> {
        self.entries.iter()
    }

    /// The most recently registered mount.
    pub fn last(&self) -> Option<&MountEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
