//! In-tree filesystem drivers
//!
//! The disk and synthetic-tree drivers (FAT32, sysfs, devfs, procfs) are
//! separate crates that register themselves at boot. What lives here is the
//! memory filesystem: the reference implementation of the backend contract,
//! used by RAM-only configurations and throughout the test suite.

pub mod memfs;
