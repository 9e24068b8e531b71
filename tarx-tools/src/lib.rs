pub mod fs;
pub mod xattr;
