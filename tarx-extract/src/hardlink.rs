//! Bookkeeping of where archive entries were extracted to, used to resolve hardlinks.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tarx_tools::fs::prefixed_path;

/// Maps archive paths to the real path the entry was extracted to.
///
/// Keys are compared byte by byte, exactly as they were recorded in the archive: `./a`, `a` and
/// `/a` are three different keys, and so are `a/b` and `a//b`. A hardlink entry only finds its
/// target if the archive recorded the link name with the very same spelling as the target's
/// own path.
///
/// The table only grows during a session. The first registration of a name wins.
#[derive(Debug, Default)]
pub struct HardlinkTable {
    links: HashMap<OsString, PathBuf>,
}

impl HardlinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that the entry recorded as `archive_path` now lives at `real_path`.
    ///
    /// Returns `false` if the name was already registered, in which case the table is left
    /// unchanged.
    pub fn insert(&mut self, archive_path: &OsStr, real_path: &Path) -> bool {
        if self.links.contains_key(archive_path) {
            return false;
        }
        self.links
            .insert(archive_path.to_owned(), real_path.to_path_buf());
        true
    }

    pub fn lookup(&self, link_target: &OsStr) -> Option<&Path> {
        self.links.get(link_target).map(PathBuf::as_path)
    }

    /// Find the file a hardlink entry should point to.
    ///
    /// Registered names resolve to the path they were extracted to. Unknown names are taken as
    /// paths below `prefix`, or used as they are without a prefix.
    pub fn resolve(&self, link_target: &OsStr, prefix: Option<&Path>) -> PathBuf {
        if let Some(real_path) = self.lookup(link_target) {
            return real_path.to_path_buf();
        }

        match prefix {
            Some(prefix) => prefixed_path(prefix, link_target),
            None => PathBuf::from(link_target),
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
