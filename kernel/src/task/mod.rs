//! Scheduler-facing process state
//!
//! The VFS never stores file descriptors: a descriptor is an integer the
//! scheduler associates with an absolute path, and the VFS consults the
//! scheduler on every call. The [`Scheduler`] trait is that narrow seam;
//! the kernel's real scheduler implements it over its task structures, and
//! the test suite substitutes a single-process stand-in.
//!
//! [`HandleTable`] is the descriptor bookkeeping a scheduler embeds: a
//! descriptor → path map with monotonically increasing allocation.

use spin::Mutex;

use hashbrown::HashMap;

use crate::fs::path::VfsPath;

/// The per-process state the VFS consumes.
pub trait Scheduler: Send + Sync {
    /// The current process's working directory, always rooted.
    fn working_directory(&self) -> VfsPath;

    /// Whether `fd` is a live descriptor of the current process.
    fn has_handle(&self, fd: usize) -> bool;

    /// The absolute path behind `fd`, if it is live.
    fn handle_path(&self, fd: usize) -> Option<VfsPath>;

    /// Allocate a descriptor for `path`.
    fn register_handle(&self, path: VfsPath) -> usize;

    /// Release `fd`. Releasing a dead descriptor is a noop.
    fn release_handle(&self, fd: usize);
}

struct HandleTableState {
    handles: HashMap<usize, VfsPath>,
    next_fd: usize,
}

/// Descriptor bookkeeping for one process.
pub struct HandleTable {
    state: Mutex<HandleTableState>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HandleTableState {
                handles: HashMap::new(),
                next_fd: 1,
            }),
        }
    }

    pub fn contains(&self, fd: usize) -> bool {
        self.state.lock().handles.contains_key(&fd)
    }

    pub fn get(&self, fd: usize) -> Option<VfsPath> {
        self.state.lock().handles.get(&fd).cloned()
    }

    /// Associate a fresh descriptor with `path`. Descriptors are never
    /// reused within a process lifetime.
    pub fn insert(&self, path: VfsPath) -> usize {
        let mut state = self.state.lock();
        let fd = state.next_fd;
        state.next_fd += 1;
        state.handles.insert(fd, path);
        fd
    }

    pub fn remove(&self, fd: usize) {
        self.state.lock().handles.remove(&fd);
    }

    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().handles.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
