use std::path::Path;

use anyhow::{Context, Error};
use nix::sys::stat::{FchmodatFlags, Mode, UtimensatFlags};
use nix::sys::time::TimeSpec;
use nix::unistd::{FchownatFlags, Gid, Uid};

use tarx_tools::xattr;

use crate::header::Metadata;
use crate::Flags;

//
// metadata application:
//

/// Restore ownership, times, permissions and the security label of an extracted object.
///
/// All steps are attempted even if an earlier one failed. The first failure of the ownership,
/// time and permission steps is returned. A failure to apply the security label is passed to
/// `on_tolerated` instead.
pub fn apply(
    flags: Flags,
    metadata: &Metadata,
    is_symlink: bool,
    path: &Path,
    on_tolerated: &mut dyn FnMut(Error),
) -> Result<(), Error> {
    let mut first_error = None;
    let mut record = |res: Result<(), Error>| {
        if let Err(err) = res {
            log::warn!("{path:?}: {err:#}");
            first_error.get_or_insert(err);
        }
    };

    record(apply_ownership(metadata, path));

    // symlinks are left with the times and mode they were created with
    if !is_symlink {
        record(apply_times(metadata, path));
        record(apply_permissions(metadata, path));
    }

    if flags.contains(Flags::WITH_SELINUX) {
        if let Err(err) = apply_security_context(metadata, path) {
            log::warn!("{path:?}: {err:#}");
            on_tolerated(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Change owner and group without following symlinks. Only done when running as root.
pub fn apply_ownership(metadata: &Metadata, path: &Path) -> Result<(), Error> {
    if !nix::unistd::geteuid().is_root() {
        return Ok(());
    }

    nix::unistd::fchownat(
        None,
        path,
        Some(Uid::from_raw(metadata.uid)),
        Some(Gid::from_raw(metadata.gid)),
        FchownatFlags::NoFollowSymlink,
    )
    .with_context(|| {
        format!(
            "failed to set ownership to {}:{}",
            metadata.uid, metadata.gid
        )
    })
}

/// Set both access and modification time to the recorded modification time.
pub fn apply_times(metadata: &Metadata, path: &Path) -> Result<(), Error> {
    let time = TimeSpec::new(metadata.mtime as libc::time_t, 0);

    nix::sys::stat::utimensat(None, path, &time, &time, UtimensatFlags::FollowSymlink)
        .context("failed to restore mtime")
}

pub fn apply_permissions(metadata: &Metadata, path: &Path) -> Result<(), Error> {
    let mode = Mode::from_bits_truncate(metadata.permissions());

    nix::sys::stat::fchmodat(None, path, mode, FchmodatFlags::FollowSymlink).with_context(|| {
        format!("failed to change file mode to {:o}", metadata.permissions())
    })
}

pub fn apply_security_context(metadata: &Metadata, path: &Path) -> Result<(), Error> {
    let context = match metadata.security_context.as_ref() {
        Some(context) => context,
        None => return Ok(()),
    };

    log::debug!("restoring SELinux context {context:?} on {path:?}");

    xattr::set_security_context(path, context)
        .with_context(|| format!("failed to restore SELinux context {context:?}"))
}
