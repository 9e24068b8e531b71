//! tarx: restore tar archives onto the file system.
//!
//! The extraction engine lives in the `tarx-extract` crate. This crate wires it up with archive
//! files, compression detection and error accounting, which is what the `tarx` command line tool
//! and other restore workflows need.

pub mod restore;

pub use tarx_extract as extract;
