//! Wrapper functions for the libc xattr calls

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;

use proxmox_sys::c_result;

/// `"security.selinux"` as a CStr to avoid typos.
#[inline]
pub fn xattr_name_selinux() -> &'static CStr {
    unsafe { CStr::from_bytes_with_nul_unchecked(b"security.selinux\0") }
}

/// Set an extended attribute on a path without following a final symlink.
pub fn lsetxattr(path: &Path, name: &CStr, data: &[u8]) -> Result<(), Errno> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| Errno::EINVAL)?;

    c_result!(unsafe {
        libc::lsetxattr(
            c_path.as_ptr(),
            name.as_ptr(),
            data.as_ptr() as *const libc::c_void,
            data.len(),
            0,
        )
    })
    .map(drop)
}

/// Label `path` with an SELinux security context.
///
/// The terminating zero is stored along with the context, matching what `lsetfilecon` does.
pub fn set_security_context(path: &Path, context: &CStr) -> Result<(), Errno> {
    lsetxattr(path, xattr_name_selinux(), context.to_bytes_with_nul())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_security_context_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let context = CString::new("u:object_r:system_file:s0").unwrap();

        let err = set_security_context(&tmp.path().join("missing"), &context).unwrap_err();
        assert_eq!(err, Errno::ENOENT);
    }

    #[test]
    fn test_lsetxattr_rejects_nul_in_path() {
        let path = Path::new(std::ffi::OsStr::from_bytes(b"bad\0path"));
        assert_eq!(
            lsetxattr(path, xattr_name_selinux(), b"x").unwrap_err(),
            Errno::EINVAL,
        );
    }
}
