//! On-wire listing records shared with user space
//!
//! Directory and mount listings are returned through caller-supplied byte
//! buffers in a self-describing layout. Words are native-endian `usize`, so
//! the record shapes follow the kernel's word size; user space is built for
//! the same target and parses them with the mirror of the readers below.
//!
//! Directory entry:
//!
//! ```text
//! offset_next : word    distance to the next entry, 0 on the last
//! type        : word
//! length      : word    name length, excluding the terminator
//! name        : length bytes + NUL
//! ```
//!
//! Mount record:
//!
//! ```text
//! offset_next : word    0 on the last record
//! length_mp   : word
//! length_dev  : word
//! length_type : word
//! strings     : mount_point NUL device NUL fs_type NUL
//! ```
//!
//! Readers advance by `offset_next` bytes from the start of the current
//! record; every writer below emits exactly the byte total it returns.

use alloc::string::String;
use alloc::vec::Vec;

use super::mount::MountTable;
use super::{FileMetadata, FileSystemError, FileSystemErrorKind};

/// Size of one on-wire word.
pub const WORD_SIZE: usize = core::mem::size_of::<usize>();

/// Fixed part of a directory entry: the three header words.
pub const DIRECTORY_ENTRY_HEADER: usize = 3 * WORD_SIZE;

/// Fixed part of a mount record: the four header words.
pub const MOUNT_RECORD_HEADER: usize = 4 * WORD_SIZE;

/// Bytes needed to serialize `files` as directory entries.
pub fn directory_entries_size(files: &[FileMetadata]) -> usize {
    files
        .iter()
        .map(|f| DIRECTORY_ENTRY_HEADER + f.name.len() + 1)
        .sum()
}

/// Bytes needed to serialize the mount table.
pub fn mount_records_size(mounts: &MountTable) -> usize {
    mounts
        .iter()
        .map(|m| {
            MOUNT_RECORD_HEADER
                + 3
                + m.mount_point.len()
                + m.device.len()
                + m.fs_type.as_str().len()
        })
        .sum()
}

/// Pack directory entries into `buffer`, returning the byte total written.
///
/// Fails with `BufferSmall` when the buffer cannot hold the whole listing;
/// nothing is written in that case.
pub fn write_directory_entries(
    files: &[FileMetadata],
    buffer: &mut [u8],
) -> Result<usize, FileSystemError> {
    let total = directory_entries_size(files);
    if buffer.len() < total {
        return Err(FileSystemError::new(
            FileSystemErrorKind::BufferSmall,
            "directory listing does not fit the caller buffer",
        ));
    }

    let mut position = 0;
    for (i, file) in files.iter().enumerate() {
        let name = file.name.as_bytes();
        let stride = DIRECTORY_ENTRY_HEADER + name.len() + 1;
        let offset_next = if i + 1 < files.len() { stride } else { 0 };

        let entry = &mut buffer[position..position + stride];
        put_word(entry, 0, offset_next);
        // TODO: derive the type word from the directory/system/hidden flags
        // once the user-space readdir shim starts consuming it.
        put_word(entry, 1, 0);
        put_word(entry, 2, name.len());
        entry[DIRECTORY_ENTRY_HEADER..DIRECTORY_ENTRY_HEADER + name.len()].copy_from_slice(name);
        entry[DIRECTORY_ENTRY_HEADER + name.len()] = 0;

        position += stride;
    }

    Ok(total)
}

/// Pack the mount table into `buffer`, returning the byte total written.
///
/// Records are emitted in registration order, strings in the order
/// mount_point, device, filesystem type.
pub fn write_mount_records(
    mounts: &MountTable,
    buffer: &mut [u8],
) -> Result<usize, FileSystemError> {
    let total = mount_records_size(mounts);
    if buffer.len() < total {
        return Err(FileSystemError::new(
            FileSystemErrorKind::BufferSmall,
            "mount listing does not fit the caller buffer",
        ));
    }

    let count = mounts.len();
    let mut position = 0;
    for (i, mount) in mounts.iter().enumerate() {
        let fs_type = mount.fs_type.as_str();
        let stride = MOUNT_RECORD_HEADER
            + 3
            + mount.mount_point.len()
            + mount.device.len()
            + fs_type.len();
        let offset_next = if i + 1 < count { stride } else { 0 };

        let record = &mut buffer[position..position + stride];
        put_word(record, 0, offset_next);
        put_word(record, 1, mount.mount_point.len());
        put_word(record, 2, mount.device.len());
        put_word(record, 3, fs_type.len());

        let mut string_pos = MOUNT_RECORD_HEADER;
        for text in [mount.mount_point.as_str(), mount.device.as_str(), fs_type] {
            record[string_pos..string_pos + text.len()].copy_from_slice(text.as_bytes());
            string_pos += text.len();
            record[string_pos] = 0;
            string_pos += 1;
        }

        position += stride;
    }

    Ok(total)
}

/// One directory entry read back from the wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub entry_type: usize,
    pub name: String,
}

/// One mount record read back from the wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub mount_point: String,
    pub device: String,
    pub fs_type: String,
}

/// Walk a serialized directory listing. This is the reader user space
/// implements; the kernel keeps it for round-trip tests. Returns `None` on
/// a malformed buffer.
pub fn parse_directory_entries(buffer: &[u8]) -> Option<Vec<DirectoryEntry>> {
    let mut entries = Vec::new();
    if buffer.is_empty() {
        return Some(entries);
    }

    let mut position = 0;
    loop {
        if buffer.len() < position + DIRECTORY_ENTRY_HEADER {
            return None;
        }
        let offset_next = get_word(buffer, position, 0)?;
        let entry_type = get_word(buffer, position, 1)?;
        let length = get_word(buffer, position, 2)?;

        let name_start = position + DIRECTORY_ENTRY_HEADER;
        let name_end = name_start.checked_add(length)?;
        if buffer.len() <= name_end || buffer[name_end] != 0 {
            return None;
        }
        let name = core::str::from_utf8(&buffer[name_start..name_end]).ok()?;
        entries.push(DirectoryEntry {
            entry_type,
            name: String::from(name),
        });

        if offset_next == 0 {
            return Some(entries);
        }
        position = position.checked_add(offset_next)?;
    }
}

/// Walk a serialized mount listing. Returns `None` on a malformed buffer.
pub fn parse_mount_records(buffer: &[u8]) -> Option<Vec<MountRecord>> {
    let mut records = Vec::new();
    if buffer.is_empty() {
        return Some(records);
    }

    let mut position = 0;
    loop {
        if buffer.len() < position + MOUNT_RECORD_HEADER {
            return None;
        }
        let offset_next = get_word(buffer, position, 0)?;
        let length_mp = get_word(buffer, position, 1)?;
        let length_dev = get_word(buffer, position, 2)?;
        let length_type = get_word(buffer, position, 3)?;

        let mut string_pos = position + MOUNT_RECORD_HEADER;
        let mut strings: [String; 3] = core::array::from_fn(|_| String::new());
        for (slot, length) in strings.iter_mut().zip([length_mp, length_dev, length_type]) {
            let end = string_pos.checked_add(length)?;
            if buffer.len() <= end || buffer[end] != 0 {
                return None;
            }
            *slot = String::from(core::str::from_utf8(&buffer[string_pos..end]).ok()?);
            string_pos = end + 1;
        }

        let [mount_point, device, fs_type] = strings;
        records.push(MountRecord {
            mount_point,
            device,
            fs_type,
        });

        if offset_next == 0 {
            return Some(records);
        }
        position = position.checked_add(offset_next)?;
    }
}

fn put_word(buffer: &mut [u8], index: usize, value: usize) {
    let start = index * WORD_SIZE;
    buffer[start..start + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
}

fn get_word(buffer: &[u8], base: usize, index: usize) -> Option<usize> {
    let start = base.checked_add(index * WORD_SIZE)?;
    let bytes = buffer.get(start..start + WORD_SIZE)?;
    let mut word = [0u8; WORD_SIZE];
    word.copy_from_slice(bytes);
    Some(usize::from_ne_bytes(word))
}
