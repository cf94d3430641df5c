//! VFS façade
//!
//! [`VfsManager`] is the single entry point the syscall layer talks to. It
//! resolves caller paths against the scheduler's working directory, picks
//! the owning mount by longest prefix, strips the prefix and dispatches the
//! backend-local remainder to the mounted filesystem.
//!
//! Every operation returns a signed status word: non-negative on success
//! (a byte count, a descriptor, a serialized total, or plain 0), the
//! additive inverse of the error code on failure. Backend errors pass
//! through unchanged; the only error the façade absorbs is `NotExists`
//! during an `open` with `CREATE`, which is answered with a `touch`.
//!
//! The manager is the process-wide mount registry. It is handed around by
//! reference as a context object; the kernel keeps one instance for its
//! lifetime, and mounts are never removed.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use spin::RwLock;

use log::{debug, trace};

use super::abi;
use super::mount::{MountEntry, MountTable};
use super::path::VfsPath;
use super::{
    FileSystemDriver, FileSystemError, FileSystemErrorKind, FileSystemOperations, FileSystemType,
    OpenFlags, StatFlags, StatFsInfo, StatInfo,
};
use crate::task::Scheduler;

/// The mount table and path-dispatch engine.
pub struct VfsManager {
    drivers: RwLock<BTreeMap<FileSystemType, Box<dyn FileSystemDriver>>>,
    mounts: RwLock<MountTable>,
    scheduler: Arc<dyn Scheduler>,
}

impl VfsManager {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            drivers: RwLock::new(BTreeMap::new()),
            mounts: RwLock::new(MountTable::new()),
            scheduler,
        }
    }

    /// Register a backend factory for one filesystem variant. Later
    /// registrations replace earlier ones.
    pub fn register_driver(&self, driver: Box<dyn FileSystemDriver>) {
        self.drivers.write().insert(driver.fs_type(), driver);
    }

    /// Build the boot-time mount layout: FAT32 at `/`, then sysfs, devfs
    /// and procfs. Once every mount is registered, each backend's `init()`
    /// runs in registration order.
    pub fn init(&self) -> i64 {
        flatten(self.init_impl())
    }

    fn init_impl(&self) -> Result<i64, FileSystemError> {
        // TODO: take the root device from boot configuration instead of
        // fixing /dev/hda1.
        self.register_mount(FileSystemType::Fat32, "/", "/dev/hda1")?;
        self.register_mount(FileSystemType::Sysfs, "/sys/", "none")?;
        self.register_mount(FileSystemType::Devfs, "/dev/", "none")?;
        self.register_mount(FileSystemType::Procfs, "/proc/", "none")?;

        let mounts = self.mounts.read();
        for entry in mounts.iter() {
            entry.init_backend()?;
        }
        trace!("vfs: boot mounts initialized");
        Ok(0)
    }

    /// Raw mount: construct a backend and append it to the mount table.
    ///
    /// No duplicate check is performed and the backend is left
    /// uninitialized; a bulk [`init`](Self::init) is expected to follow.
    pub fn mount(&self, fs_type: FileSystemType, mount_point: &str, device: &str) -> i64 {
        flatten(self.register_mount(fs_type, mount_point, device).map(|_| 0))
    }

    /// Mount through file descriptors, as the mount syscall does.
    ///
    /// Both descriptors are resolved to paths and rendered in canonical
    /// directory form; a mount point that duplicates a live mount is
    /// rejected. Unlike the raw form, the backend is initialized
    /// immediately.
    pub fn mount_handles(&self, fs_type: FileSystemType, mp_fd: usize, dev_fd: usize) -> i64 {
        flatten(self.mount_handles_impl(fs_type, mp_fd, dev_fd))
    }

    fn mount_handles_impl(
        &self,
        fs_type: FileSystemType,
        mp_fd: usize,
        dev_fd: usize,
    ) -> Result<i64, FileSystemError> {
        let mp_path = self
            .scheduler
            .handle_path(mp_fd)
            .ok_or_else(invalid_descriptor)?;
        let dev_path = self
            .scheduler
            .handle_path(dev_fd)
            .ok_or_else(invalid_descriptor)?;

        let mount_point = mp_path.to_dir_string();
        let device = dev_path.to_dir_string();

        let mut mounts = self.mounts.write();
        if mounts.contains(&mount_point) {
            return Err(FileSystemError::new(
                FileSystemErrorKind::AlreadyMounted,
                "mount point is already in use",
            ));
        }

        let backend = self.create_backend(fs_type, &mount_point, &device)?;
        mounts.add(MountEntry::new(fs_type, &*device, &*mount_point, backend));
        if let Some(entry) = mounts.last() {
            entry.init_backend()?;
        }
        trace!("vfs: mounted file system {} at {}", device, mount_point);
        Ok(0)
    }

    /// Open a file or directory, returning a fresh descriptor.
    ///
    /// Opening a mount's own root registers the descriptor without
    /// consulting the backend. With `CREATE`, a missing file is created
    /// via `touch` and the open proceeds.
    pub fn open(&self, path: &str, flags: OpenFlags) -> i64 {
        flatten(self.open_impl(path, flags))
    }

    fn open_impl(&self, path: &str, flags: OpenFlags) -> Result<i64, FileSystemError> {
        let absolute = self.absolute_path(path)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);

        if local.is_empty() {
            return Ok(self.scheduler.register_handle(absolute) as i64);
        }

        match mount.backend().get_file(&local) {
            Ok(_) => {}
            Err(error)
                if flags.contains(OpenFlags::CREATE)
                    && error.kind == FileSystemErrorKind::NotExists =>
            {
                mount.backend().touch(&local)?;
            }
            Err(error) => return Err(error),
        }

        Ok(self.scheduler.register_handle(absolute) as i64)
    }

    /// Release a descriptor. Dead descriptors are ignored.
    pub fn close(&self, fd: usize) {
        if self.scheduler.has_handle(fd) {
            self.scheduler.release_handle(fd);
        }
    }

    /// Fill `info` with the metadata behind `fd`.
    pub fn stat(&self, fd: usize, info: &mut StatInfo) -> i64 {
        flatten(self.stat_impl(fd, info))
    }

    fn stat_impl(&self, fd: usize, info: &mut StatInfo) -> Result<i64, FileSystemError> {
        let absolute = self
            .scheduler
            .handle_path(fd)
            .ok_or_else(invalid_descriptor)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);

        // Mount roots are synthesized; backends are not asked for their own
        // root metadata.
        if local.is_empty() {
            *info = StatInfo {
                size: 4096,
                flags: StatFlags::DIRECTORY,
                created: 0,
                modified: 0,
                accessed: 0,
            };
            return Ok(0);
        }

        let file = mount.backend().get_file(&local)?;
        let mut flags = StatFlags::empty();
        if file.directory {
            flags |= StatFlags::DIRECTORY;
        }
        if file.system {
            flags |= StatFlags::SYSTEM;
        }
        if file.hidden {
            flags |= StatFlags::HIDDEN;
        }
        *info = StatInfo {
            size: file.size as u64,
            flags,
            created: file.created,
            modified: file.modified,
            accessed: file.accessed,
        };
        Ok(0)
    }

    /// Read from the file behind `fd` into `buffer`, starting at `offset`.
    /// Returns the byte count; short reads at end of file are success.
    pub fn read(&self, fd: usize, buffer: &mut [u8], offset: usize) -> i64 {
        flatten(self.read_impl(fd, buffer, offset))
    }

    fn read_impl(
        &self,
        fd: usize,
        buffer: &mut [u8],
        offset: usize,
    ) -> Result<i64, FileSystemError> {
        let absolute = self.descriptor_path(fd)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);
        let read = mount.backend().read(&local, buffer, offset)?;
        Ok(read as i64)
    }

    /// Write `buffer` to the file behind `fd` at `offset`, growing the file
    /// as needed. Returns the byte count written.
    pub fn write(&self, fd: usize, buffer: &[u8], offset: usize) -> i64 {
        flatten(self.write_impl(fd, buffer, offset))
    }

    fn write_impl(&self, fd: usize, buffer: &[u8], offset: usize) -> Result<i64, FileSystemError> {
        let absolute = self.descriptor_path(fd)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);
        let written = mount.backend().write(&local, buffer, offset)?;
        Ok(written as i64)
    }

    /// Zero-fill `count` bytes of the file behind `fd` at `offset`.
    pub fn clear(&self, fd: usize, count: usize, offset: usize) -> i64 {
        flatten(self.clear_impl(fd, count, offset))
    }

    fn clear_impl(&self, fd: usize, count: usize, offset: usize) -> Result<i64, FileSystemError> {
        let absolute = self.descriptor_path(fd)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);
        let written = mount.backend().clear(&local, count, offset)?;
        Ok(written as i64)
    }

    /// Extend or shrink the file behind `fd` to exactly `size` bytes.
    pub fn truncate(&self, fd: usize, size: usize) -> i64 {
        flatten(self.truncate_impl(fd, size))
    }

    fn truncate_impl(&self, fd: usize, size: usize) -> Result<i64, FileSystemError> {
        let absolute = self.descriptor_path(fd)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);
        mount.backend().truncate(&local, size)?;
        Ok(0)
    }

    /// `read` with the path supplied inline instead of a descriptor.
    pub fn direct_read(&self, path: &str, buffer: &mut [u8], offset: usize) -> i64 {
        flatten(self.direct_read_impl(path, buffer, offset))
    }

    fn direct_read_impl(
        &self,
        path: &str,
        buffer: &mut [u8],
        offset: usize,
    ) -> Result<i64, FileSystemError> {
        let absolute = self.absolute_path(path)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);
        let read = mount.backend().read(&local, buffer, offset)?;
        Ok(read as i64)
    }

    /// `write` with the path supplied inline instead of a descriptor.
    pub fn direct_write(&self, path: &str, buffer: &[u8], offset: usize) -> i64 {
        flatten(self.direct_write_impl(path, buffer, offset))
    }

    fn direct_write_impl(
        &self,
        path: &str,
        buffer: &[u8],
        offset: usize,
    ) -> Result<i64, FileSystemError> {
        let absolute = self.absolute_path(path)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);
        let written = mount.backend().write(&local, buffer, offset)?;
        Ok(written as i64)
    }

    /// Read a whole file into `content`.
    ///
    /// The file's reported size bounds the read; `content` ends up holding
    /// exactly the bytes actually read, and that count is returned. Content
    /// that is not valid UTF-8 fails with `InvalidData`.
    pub fn direct_read_string(&self, path: &str, content: &mut String) -> i64 {
        flatten(self.direct_read_string_impl(path, content))
    }

    fn direct_read_string_impl(
        &self,
        path: &str,
        content: &mut String,
    ) -> Result<i64, FileSystemError> {
        let absolute = self.absolute_path(path)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);

        let file = mount.backend().get_file(&local)?;
        let mut buffer = alloc::vec![0u8; file.size];
        let read = mount.backend().read(&local, &mut buffer, 0)?;
        buffer.truncate(read);

        *content = String::from_utf8(buffer).map_err(|_| {
            FileSystemError::new(
                FileSystemErrorKind::InvalidData,
                "file content is not valid UTF-8",
            )
        })?;
        Ok(read as i64)
    }

    /// Create a directory.
    pub fn mkdir(&self, path: &str) -> i64 {
        flatten(self.mkdir_impl(path))
    }

    fn mkdir_impl(&self, path: &str) -> Result<i64, FileSystemError> {
        let absolute = self.absolute_path(path)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);
        debug!("vfs: mkdir {} (local {})", absolute, local);
        mount.backend().mkdir(&local)?;
        Ok(0)
    }

    /// Remove a file or directory.
    pub fn rm(&self, path: &str) -> i64 {
        flatten(self.rm_impl(path))
    }

    fn rm_impl(&self, path: &str) -> Result<i64, FileSystemError> {
        let absolute = self.absolute_path(path)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);
        mount.backend().rm(&local)?;
        Ok(0)
    }

    /// Fill `info` with the statistics of the filesystem owning
    /// `mount_point`.
    pub fn statfs(&self, mount_point: &str, info: &mut StatFsInfo) -> i64 {
        flatten(self.statfs_impl(mount_point, info))
    }

    fn statfs_impl(
        &self,
        mount_point: &str,
        info: &mut StatFsInfo,
    ) -> Result<i64, FileSystemError> {
        let absolute = self.absolute_path(mount_point)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        *info = mount.backend().statfs()?;
        Ok(0)
    }

    /// Serialize the listing of the directory behind `fd` into `buffer`,
    /// returning the byte total. Fails with `BufferSmall` when the listing
    /// does not fit.
    pub fn entries(&self, fd: usize, buffer: &mut [u8]) -> i64 {
        flatten(self.entries_impl(fd, buffer))
    }

    fn entries_impl(&self, fd: usize, buffer: &mut [u8]) -> Result<i64, FileSystemError> {
        let absolute = self
            .scheduler
            .handle_path(fd)
            .ok_or_else(invalid_descriptor)?;
        let mounts = self.mounts.read();
        let mount = owning_mount(&mounts, &absolute)?;
        let local = mount.backend_local(&absolute);

        let files = mount.backend().ls(&local)?;
        let total = abi::write_directory_entries(&files, buffer)?;
        Ok(total as i64)
    }

    /// Serialize the mount table into `buffer`, returning the byte total.
    pub fn mounts(&self, buffer: &mut [u8]) -> i64 {
        let mounts = self.mounts.read();
        flatten(abi::write_mount_records(&mounts, buffer).map(|total| total as i64))
    }

    // Helper methods

    /// Resolve a caller-supplied path string into an absolute path,
    /// consulting the scheduler's working directory for relative ones.
    fn absolute_path(&self, path: &str) -> Result<VfsPath, FileSystemError> {
        if path.is_empty() {
            return Err(FileSystemError::new(
                FileSystemErrorKind::InvalidFilePath,
                "empty path",
            ));
        }
        if path.starts_with('/') {
            Ok(VfsPath::parse(path))
        } else {
            Ok(VfsPath::from_base(
                &self.scheduler.working_directory(),
                path,
            ))
        }
    }

    /// Resolve `fd` for a data operation. A descriptor whose path has no
    /// segments (a root handle) cannot carry file content.
    fn descriptor_path(&self, fd: usize) -> Result<VfsPath, FileSystemError> {
        let path = self
            .scheduler
            .handle_path(fd)
            .ok_or_else(invalid_descriptor)?;
        if path.is_empty() {
            return Err(FileSystemError::new(
                FileSystemErrorKind::InvalidFilePath,
                "descriptor refers to an empty path",
            ));
        }
        Ok(path)
    }

    fn create_backend(
        &self,
        fs_type: FileSystemType,
        mount_point: &str,
        device: &str,
    ) -> Result<Arc<dyn FileSystemOperations>, FileSystemError> {
        if fs_type == FileSystemType::Unknown {
            return Err(invalid_file_system());
        }
        let drivers = self.drivers.read();
        let driver = drivers.get(&fs_type).ok_or_else(invalid_file_system)?;
        driver.create(mount_point, device)
    }

    fn register_mount(
        &self,
        fs_type: FileSystemType,
        mount_point: &str,
        device: &str,
    ) -> Result<(), FileSystemError> {
        let backend = self.create_backend(fs_type, mount_point, device)?;
        self.mounts
            .write()
            .add(MountEntry::new(fs_type, device, mount_point, backend));
        trace!("vfs: registered {} at {}", fs_type.as_str(), mount_point);
        Ok(())
    }
}

fn owning_mount<'a>(
    mounts: &'a MountTable,
    path: &VfsPath,
) -> Result<&'a MountEntry, FileSystemError> {
    mounts.find(path).ok_or_else(|| {
        FileSystemError::new(
            FileSystemErrorKind::InvalidFileSystem,
            "no mounted file system owns the path",
        )
    })
}

fn invalid_descriptor() -> FileSystemError {
    FileSystemError::new(
        FileSystemErrorKind::InvalidFileDescriptor,
        "dead file descriptor",
    )
}

fn invalid_file_system() -> FileSystemError {
    FileSystemError::new(
        FileSystemErrorKind::InvalidFileSystem,
        "no driver for the requested file system type",
    )
}

fn flatten(result: Result<i64, FileSystemError>) -> i64 {
    match result {
        Ok(value) => value,
        Err(error) => -error.kind.code(),
    }
}
