//! File system helper utilities.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Component, Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::{Mode, SFlag};

/// Permissions used for directories created on the way to an entry. The directory entry itself
/// narrows them down once it is extracted.
pub const MATERIALIZE_DIR_MODE: u32 = 0o777;

/// Create `path` and every missing ancestor directory.
///
/// Existing directories (or symlinks to directories) are accepted. A component that exists as
/// anything else fails with `ENOTDIR`.
pub fn materialize_path(path: &Path) -> Result<(), Errno> {
    if path.is_dir() {
        return Ok(());
    }

    let mode = Mode::from_bits_truncate(MATERIALIZE_DIR_MODE);
    let mut current = PathBuf::new();

    for component in path.components() {
        current.push(component);

        if !matches!(component, Component::Normal(_)) {
            continue;
        }

        match nix::unistd::mkdir(&current, mode) {
            Ok(()) => log::debug!("created directory {:?}", current),
            Err(Errno::EEXIST) => {
                if !current.is_dir() {
                    return Err(Errno::ENOTDIR);
                }
            }
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

/// Create every missing directory above `path`, so that the object at `path` itself can be
/// created afterwards.
pub fn materialize_parent(path: &Path) -> Result<(), Errno> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => materialize_path(parent),
        _ => Ok(()),
    }
}

/// Prepend `prefix` to `target` as `"{prefix}/{target}"`.
///
/// This is a plain byte concatenation: an absolute `target` does not replace the prefix the way
/// `Path::join` would, and neither side is normalized.
pub fn prefixed_path(prefix: &Path, target: &OsStr) -> PathBuf {
    let prefix = prefix.as_os_str().as_bytes();
    let target = target.as_bytes();

    let mut buf = Vec::with_capacity(prefix.len() + 1 + target.len());
    buf.extend_from_slice(prefix);
    buf.push(b'/');
    buf.extend_from_slice(target);

    PathBuf::from(OsString::from_vec(buf))
}

/// Map an archive path below `destination`.
///
/// Leading slashes and `.` components are dropped, `..` components are rejected. Symlinks
/// created by earlier entries are not looked at here, see [`symlink_below`].
pub fn path_below(destination: &Path, archive_path: &Path) -> Option<PathBuf> {
    let mut result = destination.to_path_buf();

    for component in archive_path.components() {
        match component {
            Component::Normal(name) => result.push(name),
            Component::RootDir | Component::CurDir => (),
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }

    Some(result)
}

/// Find the first symlink on the way from `base` to `path`, `path` itself included.
///
/// Only the components below `base` are checked, using `lstat`. The walk stops at the first
/// component that does not exist. Returns `None` if `path` is not below `base`.
pub fn symlink_below(base: &Path, path: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(base).ok()?;
    let mut current = base.to_path_buf();

    for component in rest.components() {
        current.push(component);

        match nix::sys::stat::lstat(&current) {
            Ok(stat) => {
                let file_type = SFlag::from_bits_truncate(stat.st_mode & SFlag::S_IFMT.bits());
                if file_type == SFlag::S_IFLNK {
                    return Some(current);
                }
            }
            Err(_) => break,
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_path_creates_ancestors() {
        let tmp = tempfile::tempdir().unwrap();
        let deep = tmp.path().join("a/b/c");

        materialize_path(&deep).unwrap();
        assert!(deep.is_dir());

        // a second run must not complain about the existing directories
        materialize_path(&deep).unwrap();
    }

    #[test]
    fn test_materialize_parent_leaves_leaf_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("x/y/file.txt");

        materialize_parent(&file).unwrap();
        assert!(tmp.path().join("x/y").is_dir());
        assert!(!file.exists());

        // relative single component paths have nothing to create
        materialize_parent(Path::new("file.txt")).unwrap();
    }

    #[test]
    fn test_materialize_path_not_a_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("blocker"), b"data").unwrap();

        let err = materialize_path(&tmp.path().join("blocker/sub")).unwrap_err();
        assert_eq!(err, Errno::ENOTDIR);
    }

    #[test]
    fn test_prefixed_path() {
        assert_eq!(
            prefixed_path(Path::new("/out"), OsStr::new("a/b")),
            Path::new("/out/a/b"),
        );
        assert_eq!(
            prefixed_path(Path::new("/out"), OsStr::new("/a")).as_os_str(),
            OsStr::new("/out//a"),
        );
    }

    #[test]
    fn test_path_below() {
        let dest = Path::new("/restore");
        assert_eq!(
            path_below(dest, Path::new("/data/./app")).unwrap(),
            Path::new("/restore/data/app"),
        );
        assert_eq!(path_below(dest, Path::new("./")).unwrap(), dest);
        assert!(path_below(dest, Path::new("data/../../etc")).is_none());
    }

    #[test]
    fn test_symlink_below() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("base");
        std::fs::create_dir_all(base.join("dir/sub")).unwrap();
        std::os::unix::fs::symlink(tmp.path(), base.join("esc")).unwrap();
        std::os::unix::fs::symlink("sub", base.join("dir/last")).unwrap();

        assert_eq!(symlink_below(&base, &base.join("dir/sub/file")), None);
        assert_eq!(symlink_below(&base, &base.join("missing/a/b")), None);
        assert_eq!(
            symlink_below(&base, &base.join("esc/file")),
            Some(base.join("esc")),
        );
        assert_eq!(
            symlink_below(&base, &base.join("dir/last")),
            Some(base.join("dir/last")),
        );

        // symlinks above the base are the caller's business
        let linked_base = tmp.path().join("linked");
        std::os::unix::fs::symlink(&base, &linked_base).unwrap();
        assert_eq!(symlink_below(&linked_base, &linked_base.join("dir/sub")), None);
        assert_eq!(symlink_below(&base, Path::new("/elsewhere")), None);
    }
}
