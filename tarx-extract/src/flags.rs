//! Session flags controlling how entries are restored.

use bitflags::bitflags;

bitflags! {
    #[derive(Default)]
    pub struct Flags: u32 {
        /// Fail entries whose target path already exists instead of replacing it
        const NO_OVERWRITE                     = 0x1;
        /// Restore the SELinux security context recorded in the archive
        const WITH_SELINUX                     = 0x2;
    }
}

impl Flags {
    /// Default flags for extraction: overwrite existing objects, ignore security labels
    pub const DEFAULT: Flags = Flags::empty();
}
