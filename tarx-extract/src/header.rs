//! Decoded archive entries as seen by the extractor.

use std::ffi::{CString, OsString};
use std::path::Path;

/// Device numbers of a character or block device node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Device {
    pub major: u64,
    pub minor: u64,
}

impl Device {
    pub fn to_dev_t(&self) -> libc::dev_t {
        nix::sys::stat::makedev(self.major, self.minor)
    }
}

/// The type of an entry along with its type specific data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file followed by `size` bytes of data.
    File { size: u64 },
    Directory,
    /// Symbolic link, the target is used verbatim.
    Symlink(OsString),
    /// Hard link to the entry recorded under this name earlier in the archive.
    Hardlink(OsString),
    CharDevice(Device),
    BlockDevice(Device),
    Fifo,
}

impl EntryKind {
    /// Short name used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File { .. } => "reg",
            EntryKind::Directory => "dir",
            EntryKind::Symlink(_) => "sym",
            EntryKind::Hardlink(_) => "link",
            EntryKind::CharDevice(_) => "chr",
            EntryKind::BlockDevice(_) => "blk",
            EntryKind::Fifo => "fifo",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership, permissions and times to restore on an extracted object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Permission bits including setuid, setgid and sticky bit.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Modification time in seconds since the epoch.
    pub mtime: i64,
    /// SELinux context, if the archive carries one for this entry.
    pub security_context: Option<CString>,
}

impl Metadata {
    pub fn new(mode: u32, uid: u32, gid: u32, mtime: i64) -> Self {
        Self {
            mode,
            uid,
            gid,
            mtime,
            security_context: None,
        }
    }

    pub fn with_security_context(mut self, context: CString) -> Self {
        self.security_context = Some(context);
        self
    }

    /// The permission part of `mode`.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// One decoded archive entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// The path exactly as recorded in the archive.
    pub path: OsString,
    pub kind: EntryKind,
    pub metadata: Metadata,
}

impl Header {
    pub fn new<P: Into<OsString>>(path: P, kind: EntryKind, metadata: Metadata) -> Self {
        Self {
            path: path.into(),
            kind,
            metadata,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }

    #[inline]
    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Number of data bytes following this header in the archive.
    pub fn data_size(&self) -> u64 {
        match self.kind {
            EntryKind::File { size } => size,
            _ => 0,
        }
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, EntryKind::Symlink(_))
    }

    #[inline]
    pub fn is_hardlink(&self) -> bool {
        matches!(self.kind, EntryKind::Hardlink(_))
    }
}
