//! Extraction of tar archives onto the file system.
//!
//! The archive itself is consumed through the [`BlockStream`] trait: something else decodes the
//! tar headers and hands out the entry data in fixed size blocks. [`TarBlockStream`] provides
//! this on top of the `tar` crate.
//!
//! An [`Extractor`] is one extraction session. It dispatches every entry to the routine for its
//! type, restores ownership, times, permissions and optionally the SELinux label, and remembers
//! where each entry ended up so that later hardlink entries can be pointed at the real file.
//!
//! Hardlinks and device nodes are restored on a best-effort basis: failing to create them is
//! logged and recorded in [`Extractor::tolerated_errors`], but does not fail the entry.

mod flags;
pub use flags::Flags;

pub mod extract;
pub mod hardlink;
pub mod header;
pub mod metadata;
pub mod stream;
pub mod tools;

pub use extract::{
    extract_archive, list_archive, ErrorHandler, ExtractContext, ExtractError, ExtractOptions,
    Extractor,
};
pub use hardlink::HardlinkTable;
pub use header::{Device, EntryKind, Header, Metadata};
pub use stream::{BlockStream, InvalidEntry, TarBlockStream, BLOCK_SIZE};
pub use tools::format_single_line_entry;
