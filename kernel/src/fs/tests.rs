//! Façade-level tests against a memfs-backed boot layout.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::RwLock;

use crate::fs::abi::{self, DIRECTORY_ENTRY_HEADER, MOUNT_RECORD_HEADER};
use crate::fs::drivers::memfs::MemFsDriver;
use crate::fs::path::VfsPath;
use crate::fs::vfs::VfsManager;
use crate::fs::{FileSystemType, OpenFlags, StatFlags, StatFsInfo, StatInfo};
use crate::task::{HandleTable, Scheduler};

/// Single-process stand-in for the kernel scheduler.
struct TestScheduler {
    cwd: RwLock<VfsPath>,
    handles: HandleTable,
}

impl TestScheduler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cwd: RwLock::new(VfsPath::root()),
            handles: HandleTable::new(),
        })
    }

    fn set_cwd(&self, path: &str) {
        *self.cwd.write() = VfsPath::parse(path);
    }
}

impl Scheduler for TestScheduler {
    fn working_directory(&self) -> VfsPath {
        self.cwd.read().clone()
    }

    fn has_handle(&self, fd: usize) -> bool {
        self.handles.contains(fd)
    }

    fn handle_path(&self, fd: usize) -> Option<VfsPath> {
        self.handles.get(fd)
    }

    fn register_handle(&self, path: VfsPath) -> usize {
        self.handles.insert(path)
    }

    fn release_handle(&self, fd: usize) {
        self.handles.remove(fd)
    }
}

/// Boot the standard mount layout with memfs standing in for every driver.
fn boot() -> (VfsManager, Arc<TestScheduler>) {
    let scheduler = TestScheduler::new();
    let vfs = VfsManager::new(scheduler.clone());
    for fs_type in [
        FileSystemType::Fat32,
        FileSystemType::Sysfs,
        FileSystemType::Devfs,
        FileSystemType::Procfs,
    ] {
        vfs.register_driver(Box::new(MemFsDriver::new(fs_type)));
    }
    assert_eq!(vfs.init(), 0);
    (vfs, scheduler)
}

fn open_fd(vfs: &VfsManager, path: &str, flags: OpenFlags) -> usize {
    let fd = vfs.open(path, flags);
    assert!(fd >= 0, "open({}) failed: {}", path, fd);
    fd as usize
}

fn mount_record_size(mount_point: &str, device: &str, fs_type: &str) -> usize {
    MOUNT_RECORD_HEADER + 3 + mount_point.len() + device.len() + fs_type.len()
}

#[test]
fn boot_mount_listing_matches_layout() {
    let (vfs, _) = boot();

    let expected: usize = [
        mount_record_size("/", "/dev/hda1", "FAT32"),
        mount_record_size("/sys/", "none", "sysfs"),
        mount_record_size("/dev/", "none", "devfs"),
        mount_record_size("/proc/", "none", "procfs"),
    ]
    .iter()
    .sum();

    let mut buffer = vec![0u8; 4096];
    let total = vfs.mounts(&mut buffer);
    assert_eq!(total, expected as i64);

    let records = abi::parse_mount_records(&buffer[..expected]).unwrap();
    let triples: Vec<_> = records
        .iter()
        .map(|r| (r.mount_point.as_str(), r.device.as_str(), r.fs_type.as_str()))
        .collect();
    assert_eq!(
        triples,
        [
            ("/", "/dev/hda1", "FAT32"),
            ("/sys/", "none", "sysfs"),
            ("/dev/", "none", "devfs"),
            ("/proc/", "none", "procfs"),
        ]
    );

    // An exact-size buffer still fits; one byte less does not.
    let mut exact = vec![0u8; expected];
    assert_eq!(vfs.mounts(&mut exact), expected as i64);
    let mut short = vec![0u8; expected - 1];
    assert_eq!(vfs.mounts(&mut short), -6);
}

#[test]
fn open_mount_root_synthesizes_stat() {
    let (vfs, _) = boot();

    let fd = open_fd(&vfs, "/sys/", OpenFlags::empty());
    let mut info = StatInfo::default();
    assert_eq!(vfs.stat(fd, &mut info), 0);
    assert_eq!(info.size, 4096);
    assert_eq!(info.flags, StatFlags::DIRECTORY);
    assert_eq!(info.created, 0);
    assert_eq!(info.modified, 0);
    assert_eq!(info.accessed, 0);
}

#[test]
fn relative_open_with_create_resolves_against_cwd() {
    let (vfs, scheduler) = boot();

    assert_eq!(vfs.mkdir("/home"), 0);
    assert_eq!(vfs.mkdir("/home/user"), 0);
    scheduler.set_cwd("/home/user");

    let fd = open_fd(&vfs, "notes.txt", OpenFlags::CREATE);
    assert_eq!(
        scheduler.handle_path(fd),
        Some(VfsPath::parse("/home/user/notes.txt"))
    );

    // The file landed on the root filesystem under the absolute path.
    let fd2 = open_fd(&vfs, "/home/user/notes.txt", OpenFlags::empty());
    let mut info = StatInfo::default();
    assert_eq!(vfs.stat(fd2, &mut info), 0);
    assert_eq!(info.size, 0);
    assert!(!info.flags.contains(StatFlags::DIRECTORY));
}

#[test]
fn open_and_close_leave_the_handle_table_unchanged() {
    let (vfs, scheduler) = boot();
    assert!(scheduler.handles.is_empty());

    let fd = open_fd(&vfs, "/sys/", OpenFlags::empty());
    assert_eq!(scheduler.handles.len(), 1);

    vfs.close(fd);
    assert!(scheduler.handles.is_empty());

    // Closing a dead descriptor is a silent noop.
    vfs.close(fd);
    assert!(scheduler.handles.is_empty());
}

#[test]
fn open_without_create_surfaces_not_exists() {
    let (vfs, scheduler) = boot();
    assert_eq!(vfs.open("/missing.txt", OpenFlags::empty()), -5);
    assert!(scheduler.handles.is_empty());

    // An empty path never reaches the backend.
    assert_eq!(vfs.open("", OpenFlags::empty()), -2);
}

#[test]
fn create_is_idempotent_for_existing_files() {
    let (vfs, _) = boot();
    let fd = open_fd(&vfs, "/twice.txt", OpenFlags::CREATE);
    vfs.write(fd, b"abc", 0);

    // A second CREATE open finds the file instead of touching it again.
    let fd2 = open_fd(&vfs, "/twice.txt", OpenFlags::CREATE);
    let mut info = StatInfo::default();
    assert_eq!(vfs.stat(fd2, &mut info), 0);
    assert_eq!(info.size, 3);
}

#[test]
fn read_returns_short_counts_at_end_of_file() {
    let (vfs, _) = boot();
    let fd = open_fd(&vfs, "/short.bin", OpenFlags::CREATE);
    assert_eq!(vfs.write(fd, b"abcd", 0), 4);

    let mut buffer = [0u8; 10];
    assert_eq!(vfs.read(fd, &mut buffer, 0), 4);
    assert_eq!(&buffer[..4], b"abcd");
}

#[test]
fn clear_and_truncate_through_descriptors() {
    let (vfs, _) = boot();
    let fd = open_fd(&vfs, "/blob", OpenFlags::CREATE);
    assert_eq!(vfs.write(fd, b"abcdef", 0), 6);

    assert_eq!(vfs.clear(fd, 2, 1), 2);
    let mut buffer = [0u8; 6];
    assert_eq!(vfs.read(fd, &mut buffer, 0), 6);
    assert_eq!(&buffer, b"a\0\0def");

    assert_eq!(vfs.truncate(fd, 2), 0);
    let mut info = StatInfo::default();
    assert_eq!(vfs.stat(fd, &mut info), 0);
    assert_eq!(info.size, 2);

    assert_eq!(vfs.truncate(fd, 4), 0);
    assert_eq!(vfs.read(fd, &mut buffer, 0), 4);
    assert_eq!(&buffer[..4], b"a\0\0\0");
}

#[test]
fn root_handles_reject_data_operations() {
    let (vfs, _) = boot();
    let fd = open_fd(&vfs, "/", OpenFlags::empty());

    let mut buffer = [0u8; 4];
    assert_eq!(vfs.read(fd, &mut buffer, 0), -2);
    assert_eq!(vfs.write(fd, b"x", 0), -2);
    assert_eq!(vfs.clear(fd, 1, 0), -2);
    assert_eq!(vfs.truncate(fd, 0), -2);
}

#[test]
fn dead_descriptors_are_rejected() {
    let (vfs, _) = boot();
    let mut buffer = [0u8; 4];
    let mut info = StatInfo::default();

    assert_eq!(vfs.read(99, &mut buffer, 0), -1);
    assert_eq!(vfs.write(99, b"x", 0), -1);
    assert_eq!(vfs.stat(99, &mut info), -1);
    assert_eq!(vfs.entries(99, &mut buffer), -1);
    assert_eq!(vfs.mount_handles(FileSystemType::Fat32, 99, 98), -1);
}

#[test]
fn statfs_requires_a_mount_point_string() {
    let (vfs, _) = boot();
    let mut info = StatFsInfo::default();
    assert_eq!(vfs.statfs("", &mut info), -2);
    assert_eq!(vfs.statfs("/sys/", &mut info), 0);
}

#[test]
fn statfs_reports_backend_statistics() {
    let scheduler = TestScheduler::new();
    let vfs = VfsManager::new(scheduler.clone());
    vfs.register_driver(Box::new(MemFsDriver::with_quota(
        FileSystemType::Fat32,
        1024,
    )));
    for fs_type in [
        FileSystemType::Sysfs,
        FileSystemType::Devfs,
        FileSystemType::Procfs,
    ] {
        vfs.register_driver(Box::new(MemFsDriver::new(fs_type)));
    }
    assert_eq!(vfs.init(), 0);

    let fd = open_fd(&vfs, "/data", OpenFlags::CREATE);
    assert_eq!(vfs.write(fd, &[0xabu8; 100], 0), 100);

    let mut info = StatFsInfo::default();
    assert_eq!(vfs.statfs("/", &mut info), 0);
    assert_eq!(info.total_size, 1024);
    assert_eq!(info.free_size, 924);
}

#[test]
fn mounting_over_a_live_mount_point_is_rejected() {
    let (vfs, _) = boot();

    let mp_fd = open_fd(&vfs, "/sys/", OpenFlags::empty());
    let dev_fd = open_fd(&vfs, "/dev/hda2", OpenFlags::CREATE);
    assert_eq!(
        vfs.mount_handles(FileSystemType::Fat32, mp_fd, dev_fd),
        -4
    );
}

#[test]
fn mount_handles_registers_and_initializes_a_new_mount() {
    let (vfs, _) = boot();

    assert_eq!(vfs.mkdir("/mnt"), 0);
    let mp_fd = open_fd(&vfs, "/mnt", OpenFlags::empty());
    let dev_fd = open_fd(&vfs, "/dev/hda2", OpenFlags::CREATE);
    assert_eq!(vfs.mount_handles(FileSystemType::Fat32, mp_fd, dev_fd), 0);

    // The listing gains a fifth record in canonical directory form.
    let mut buffer = vec![0u8; 4096];
    let total = vfs.mounts(&mut buffer);
    assert!(total > 0);
    let records = abi::parse_mount_records(&buffer[..total as usize]).unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(records[4].mount_point, "/mnt/");
    assert_eq!(records[4].device, "/dev/hda2/");
    assert_eq!(records[4].fs_type, "FAT32");

    // Paths under /mnt now dispatch to the fresh (empty) filesystem.
    let dir_fd = open_fd(&vfs, "/mnt/", OpenFlags::empty());
    let mut listing = [0u8; 64];
    assert_eq!(vfs.entries(dir_fd, &mut listing), 0);
}

#[test]
fn unknown_or_unregistered_types_cannot_be_mounted() {
    let (vfs, _) = boot();
    assert_eq!(vfs.mount(FileSystemType::Unknown, "/x/", "none"), -3);

    let bare = VfsManager::new(TestScheduler::new());
    assert_eq!(bare.mount(FileSystemType::Fat32, "/", "/dev/hda1"), -3);
}

#[test]
fn init_fails_when_a_boot_driver_is_missing() {
    let scheduler = TestScheduler::new();
    let vfs = VfsManager::new(scheduler);
    vfs.register_driver(Box::new(MemFsDriver::new(FileSystemType::Fat32)));
    assert_eq!(vfs.init(), -3);
}

#[test]
fn entries_serializes_exactly_what_it_reports() {
    let (vfs, _) = boot();
    assert_eq!(vfs.mkdir("/docs"), 0);
    open_fd(&vfs, "/docs/a", OpenFlags::CREATE);
    open_fd(&vfs, "/docs/bb", OpenFlags::CREATE);

    let fd = open_fd(&vfs, "/docs", OpenFlags::empty());
    let expected = (DIRECTORY_ENTRY_HEADER + 2) + (DIRECTORY_ENTRY_HEADER + 3);

    let mut short = vec![0u8; expected - 1];
    assert_eq!(vfs.entries(fd, &mut short), -6);

    // Bytes past the reported total stay untouched.
    let mut buffer = vec![0xaau8; expected + 16];
    let total = vfs.entries(fd, &mut buffer);
    assert_eq!(total, expected as i64);
    assert!(buffer[expected..].iter().all(|&b| b == 0xaa));

    let parsed = abi::parse_directory_entries(&buffer[..expected]).unwrap();
    let names: Vec<_> = parsed.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["a", "bb"]);
}

#[test]
fn entries_of_a_mount_root_lists_the_backend_root() {
    let (vfs, _) = boot();
    open_fd(&vfs, "/sys/uptime", OpenFlags::CREATE);

    let fd = open_fd(&vfs, "/sys/", OpenFlags::empty());
    let mut buffer = [0u8; 128];
    let total = vfs.entries(fd, &mut buffer);
    assert!(total > 0);

    let parsed = abi::parse_directory_entries(&buffer[..total as usize]).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].name, "uptime");
}

#[test]
fn dispatch_keeps_sibling_mounts_apart() {
    let (vfs, _) = boot();
    open_fd(&vfs, "/dev/tty", OpenFlags::CREATE);

    // The file exists on devfs, not on the root filesystem.
    let dev_fd = open_fd(&vfs, "/dev/", OpenFlags::empty());
    let mut buffer = [0u8; 256];
    let total = vfs.entries(dev_fd, &mut buffer);
    let names: Vec<_> = abi::parse_directory_entries(&buffer[..total as usize])
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["tty"]);

    let root_fd = open_fd(&vfs, "/", OpenFlags::empty());
    let total = vfs.entries(root_fd, &mut buffer);
    let names: Vec<String> = abi::parse_directory_entries(&buffer[..total as usize])
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert!(!names.contains(&String::from("tty")));
}

#[test]
fn direct_read_and_write_skip_the_descriptor_table() {
    let (vfs, scheduler) = boot();
    let fd = open_fd(&vfs, "/note", OpenFlags::CREATE);
    vfs.close(fd);
    assert!(scheduler.handles.is_empty());

    assert_eq!(vfs.direct_write("/note", b"payload", 0), 7);
    let mut buffer = [0u8; 16];
    assert_eq!(vfs.direct_read("/note", &mut buffer, 0), 7);
    assert_eq!(&buffer[..7], b"payload");
    assert_eq!(vfs.direct_read("/note", &mut buffer, 4), 3);
    assert_eq!(&buffer[..3], b"oad");

    assert!(scheduler.handles.is_empty());
}

#[test]
fn direct_read_string_reads_whole_files() {
    let (vfs, scheduler) = boot();
    let fd = open_fd(&vfs, "/proc/version", OpenFlags::CREATE);
    assert_eq!(vfs.write(fd, b"vermilion 0.1.0", 0), 15);

    let mut content = String::new();
    let read = vfs.direct_read_string("/proc/version", &mut content);
    assert_eq!(read, 15);
    assert_eq!(content.len(), read as usize);
    assert_eq!(content, "vermilion 0.1.0");

    // Relative form, resolved against the working directory.
    scheduler.set_cwd("/proc");
    let read = vfs.direct_read_string("version", &mut content);
    assert_eq!(read, 15);

    assert_eq!(vfs.direct_read_string("/proc/missing", &mut content), -5);
}

#[test]
fn mkdir_and_rm_round_trip() {
    let (vfs, _) = boot();

    assert_eq!(vfs.mkdir(""), -2);
    assert_eq!(vfs.rm(""), -2);

    assert_eq!(vfs.mkdir("/tmp"), 0);
    assert_eq!(vfs.mkdir("/tmp"), -9);
    open_fd(&vfs, "/tmp/file", OpenFlags::CREATE);

    assert_eq!(vfs.rm("/tmp"), -14);
    assert_eq!(vfs.rm("/tmp/file"), 0);
    assert_eq!(vfs.rm("/tmp"), 0);
    assert_eq!(vfs.rm("/tmp"), -5);
}

#[test]
fn stat_translates_backend_flags() {
    let (vfs, _) = boot();
    assert_eq!(vfs.mkdir("/srv"), 0);

    let fd = open_fd(&vfs, "/srv", OpenFlags::empty());
    let mut info = StatInfo::default();
    assert_eq!(vfs.stat(fd, &mut info), 0);
    assert!(info.flags.contains(StatFlags::DIRECTORY));
    // Backend timestamps flow through for non-root paths.
    assert!(info.modified > 0);
}
