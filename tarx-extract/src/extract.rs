//! Code for extraction of tar entries onto the file system.

use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::IntoRawFd;
use std::path::{Path, PathBuf};

use anyhow::{bail, format_err, Context, Error};
use nix::errno::Errno;
use nix::sys::stat::{Mode, SFlag};
use nix::unistd::LinkatFlags;

use tarx_tools::fs::{materialize_parent, materialize_path, path_below, symlink_below};

use crate::hardlink::HardlinkTable;
use crate::header::{Device, EntryKind, Header, Metadata};
use crate::metadata;
use crate::stream::{BlockStream, InvalidEntry, BLOCK_SIZE};
use crate::Flags;

/// Called with every failed entry by [`extract_archive`]. Returning `Ok` continues with the next
/// entry, returning the error aborts the extraction.
pub type ErrorHandler = Box<dyn FnMut(Error) -> Result<(), Error> + Send>;

pub struct ExtractOptions {
    pub flags: Flags,
    pub on_error: Option<ErrorHandler>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            flags: Flags::DEFAULT,
            on_error: None,
        }
    }
}

/// Tells which step an [`ExtractError::Entry`] failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExtractContext {
    ExtractDirectory,
    ExtractFile,
    ExtractSymlink,
    ExtractHardlink,
    ExtractDevice,
    ExtractFifo,
    RestoreMetadata,
    SkipFile,
    InvalidPath,
}

impl ExtractContext {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        use ExtractContext::*;

        match *self {
            ExtractDirectory => "failed to extract directory",
            ExtractFile => "failed to extract file",
            ExtractSymlink => "failed to extract symlink",
            ExtractHardlink => "failed to extract hardlink",
            ExtractDevice => "failed to extract device",
            ExtractFifo => "failed to extract named pipe",
            RestoreMetadata => "failed to restore metadata of",
            SkipFile => "failed to skip file data of",
            InvalidPath => "refusing to extract",
        }
    }
}

impl std::fmt::Display for ExtractContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Overwrite protection is active and something exists at the target path. Nothing was
    /// changed on disk.
    #[error("{0:?} already exists")]
    AlreadyExists(PathBuf),

    /// The entry could not be restored.
    #[error("{context} {path:?}")]
    Entry {
        context: ExtractContext,
        path: PathBuf,
        #[source]
        source: Error,
    },
}

impl ExtractError {
    fn entry(context: ExtractContext, path: &Path, source: Error) -> Self {
        ExtractError::Entry {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ExtractError::AlreadyExists(path) => path,
            ExtractError::Entry { path, .. } => path,
        }
    }

    /// The failed step, `None` for [`ExtractError::AlreadyExists`].
    pub fn context(&self) -> Option<ExtractContext> {
        match self {
            ExtractError::AlreadyExists(_) => None,
            ExtractError::Entry { context, .. } => Some(*context),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ExtractError::AlreadyExists(_))
    }
}

/// What a type specific extractor left on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The object exists at the target path.
    Created,
    /// Creating the object failed in a way which does not fail the entry.
    Tolerated,
}

/// State of one extraction session.
///
/// Entries have to be passed in archive order, since hardlinks can only be resolved to entries
/// extracted before them, and the data blocks of a regular file are read from the stream right
/// after its header.
#[derive(Debug)]
pub struct Extractor {
    flags: Flags,
    hardlinks: HardlinkTable,
    tolerated: Vec<Error>,
    /// Refuse to write regular files through a symlink at the target path.
    no_follow: bool,
}

impl Extractor {
    /// Create a new extraction session.
    pub fn new(flags: Flags) -> Self {
        Self {
            flags,
            hardlinks: HardlinkTable::new(),
            tolerated: Vec::new(),
            no_follow: false,
        }
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn hardlinks(&self) -> &HardlinkTable {
        &self.hardlinks
    }

    /// Errors which were logged but did not fail their entry.
    pub fn tolerated_errors(&self) -> &[Error] {
        &self.tolerated
    }

    pub fn take_tolerated_errors(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.tolerated)
    }

    fn tolerate(&mut self, err: Error) {
        log::warn!("{:#}", err);
        self.tolerated.push(err);
    }

    /// Extract one entry to `target`.
    ///
    /// For regular files the data blocks are consumed from `stream`. `prefix` is put in front of
    /// hardlink targets which were not extracted in this session.
    pub fn extract_entry<S: BlockStream + ?Sized>(
        &mut self,
        stream: &mut S,
        header: &Header,
        target: &Path,
        prefix: Option<&Path>,
    ) -> Result<(), ExtractError> {
        if self.flags.contains(Flags::NO_OVERWRITE) && object_exists(target) {
            return Err(ExtractError::AlreadyExists(target.to_path_buf()));
        }

        log::debug!("{} {:?}", header.kind, target);

        let metadata = header.metadata();
        let (context, res) = match header.kind() {
            EntryKind::Directory => (
                ExtractContext::ExtractDirectory,
                self.extract_directory(metadata, target),
            ),
            EntryKind::File { size } => (
                ExtractContext::ExtractFile,
                self.extract_file(stream, *size, target),
            ),
            EntryKind::Symlink(link) => (
                ExtractContext::ExtractSymlink,
                self.extract_symlink(link, target),
            ),
            EntryKind::Hardlink(link) => (
                ExtractContext::ExtractHardlink,
                self.extract_hardlink(link, target, prefix),
            ),
            EntryKind::CharDevice(device) => (
                ExtractContext::ExtractDevice,
                self.extract_device(SFlag::S_IFCHR, metadata, device, target),
            ),
            EntryKind::BlockDevice(device) => (
                ExtractContext::ExtractDevice,
                self.extract_device(SFlag::S_IFBLK, metadata, device, target),
            ),
            EntryKind::Fifo => (
                ExtractContext::ExtractFifo,
                self.extract_fifo(metadata, target),
            ),
        };

        match res.map_err(|err| ExtractError::entry(context, target, err))? {
            Outcome::Created => (),
            Outcome::Tolerated => return Ok(()),
        }

        if !header.is_hardlink() && !header.is_symlink() {
            self.hardlinks.insert(&header.path, target);
        }

        let Self {
            flags, tolerated, ..
        } = self;
        metadata::apply(
            *flags,
            metadata,
            header.is_symlink(),
            target,
            &mut |err| tolerated.push(err),
        )
        .map_err(|err| ExtractError::entry(ExtractContext::RestoreMetadata, target, err))
    }

    /// Consume the data blocks of an entry without writing them anywhere.
    pub fn skip_entry<S: BlockStream + ?Sized>(
        &mut self,
        stream: &mut S,
        header: &Header,
    ) -> Result<(), ExtractError> {
        copy_blocks(stream, header.data_size(), &mut io::sink())
            .map_err(|err| ExtractError::entry(ExtractContext::SkipFile, header.path(), err))
    }

    pub fn extract_directory(
        &mut self,
        metadata: &Metadata,
        target: &Path,
    ) -> Result<Outcome, Error> {
        materialize_parent(target).context("failed to create parent directories")?;

        match nix::unistd::mkdir(target, Mode::from_bits_truncate(metadata.permissions())) {
            Ok(()) => (),
            Err(Errno::EEXIST) if is_directory(target) => {
                log::debug!("using existing directory {:?}", target)
            }
            Err(err) => return Err(err).context("failed to create directory"),
        }

        Ok(Outcome::Created)
    }

    pub fn extract_file<S: BlockStream + ?Sized>(
        &mut self,
        stream: &mut S,
        size: u64,
        target: &Path,
    ) -> Result<Outcome, Error> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true).mode(0o666);
        if self.no_follow {
            options.custom_flags(libc::O_NOFOLLOW);
        }

        let file = materialize_parent(target)
            .context("failed to create parent directories")
            .and_then(|()| options.open(target).context("failed to create file"));

        let mut file = match file {
            Ok(file) => file,
            Err(err) => {
                // the data still has to be consumed for the following entries
                copy_blocks(stream, size, &mut io::sink())?;
                return Err(err);
            }
        };

        copy_blocks(stream, size, &mut file)?;

        nix::unistd::close(file.into_raw_fd()).context("failed to close file")?;

        Ok(Outcome::Created)
    }

    /// Symlinks always replace whatever is in their way.
    pub fn extract_symlink(&mut self, link: &OsStr, target: &Path) -> Result<Outcome, Error> {
        materialize_parent(target).context("failed to create parent directories")?;

        match nix::unistd::unlink(target) {
            Ok(()) | Err(Errno::ENOENT) => (),
            Err(err) => return Err(err).context("failed to remove existing entry"),
        }

        nix::unistd::symlinkat(link, None, target)
            .with_context(|| format!("failed to create symlink to {link:?}"))?;

        Ok(Outcome::Created)
    }

    pub fn extract_hardlink(
        &mut self,
        link: &OsStr,
        target: &Path,
        prefix: Option<&Path>,
    ) -> Result<Outcome, Error> {
        materialize_parent(target).context("failed to create parent directories")?;

        let source = self.hardlinks.resolve(link, prefix);
        log::debug!("linking {:?} to {:?}", target, source);

        match nix::unistd::linkat(
            None,
            source.as_path(),
            None,
            target,
            LinkatFlags::NoSymlinkFollow,
        ) {
            Ok(()) => Ok(Outcome::Created),
            Err(err) => {
                self.tolerate(format_err!(
                    "failed to restore hardlink {target:?} to {source:?}: {err}"
                ));
                Ok(Outcome::Tolerated)
            }
        }
    }

    pub fn extract_device(
        &mut self,
        kind: SFlag,
        metadata: &Metadata,
        device: &Device,
        target: &Path,
    ) -> Result<Outcome, Error> {
        materialize_parent(target).context("failed to create parent directories")?;

        let mode = Mode::from_bits_truncate(metadata.permissions());
        match nix::sys::stat::mknod(target, kind, mode, device.to_dev_t()) {
            Ok(()) => Ok(Outcome::Created),
            Err(err) => {
                self.tolerate(format_err!(
                    "failed to create device node {target:?} ({},{}): {err}",
                    device.major,
                    device.minor,
                ));
                Ok(Outcome::Tolerated)
            }
        }
    }

    pub fn extract_fifo(&mut self, metadata: &Metadata, target: &Path) -> Result<Outcome, Error> {
        materialize_parent(target).context("failed to create parent directories")?;

        nix::unistd::mkfifo(target, Mode::from_bits_truncate(metadata.permissions()))
            .context("failed to create named pipe")?;

        Ok(Outcome::Created)
    }
}

/// Only real directories count, not symlinks pointing to one.
fn is_directory(path: &Path) -> bool {
    match nix::sys::stat::lstat(path) {
        Ok(stat) => {
            SFlag::from_bits_truncate(stat.st_mode & SFlag::S_IFMT.bits()) == SFlag::S_IFDIR
        }
        Err(_) => false,
    }
}

/// Anything `lstat` does not positively rule out counts as existing.
fn object_exists(path: &Path) -> bool {
    !matches!(nix::sys::stat::lstat(path), Err(Errno::ENOENT))
}

/// Copy `size` bytes of entry data block by block, dropping the padding of the final block.
///
/// After a write error the remaining blocks are still read, so the stream stays positioned at
/// the next header.
fn copy_blocks<S, W>(stream: &mut S, size: u64, out: &mut W) -> Result<(), Error>
where
    S: BlockStream + ?Sized,
    W: Write + ?Sized,
{
    let mut block = [0u8; BLOCK_SIZE];
    let mut remaining = size;
    let mut write_error = None;

    while remaining > 0 {
        let got = stream
            .read_block(&mut block)
            .context("failed to read from archive")?;

        if got != BLOCK_SIZE {
            bail!(
                "unexpected end of archive data: got {} of {} bytes with {} of {} bytes left",
                got,
                BLOCK_SIZE,
                remaining,
                size,
            );
        }

        let len = remaining.min(BLOCK_SIZE as u64) as usize;
        if write_error.is_none() {
            write_error = out.write_all(&block[..len]).err();
        }
        remaining -= len as u64;
    }

    match write_error {
        Some(err) => Err(err).context("failed to write file contents"),
        None => Ok(()),
    }
}

/// Make sure an entry placed at `target` stays below `destination`.
///
/// Earlier entries may have left symlinks in the destination. Neither the parent directories of
/// the target nor the file a hardlink points to may go through one.
fn check_confined(
    hardlinks: &HardlinkTable,
    destination: &Path,
    header: &Header,
    target: &Path,
) -> Result<(), Error> {
    if let Some(symlink) = target.parent().and_then(|parent| symlink_below(destination, parent)) {
        bail!("parent directory {symlink:?} is a symlink");
    }

    if let EntryKind::Hardlink(link) = header.kind() {
        let source = match hardlinks.lookup(link) {
            Some(real_path) => real_path.to_path_buf(),
            None => path_below(destination, Path::new(link))
                .ok_or_else(|| format_err!("hardlink target {link:?} leaves the destination"))?,
        };

        if let Some(symlink) = symlink_below(destination, &source) {
            bail!("hardlink target {link:?} goes through symlink {symlink:?}");
        }
    }

    Ok(())
}

/// Extract a complete archive below `destination`.
///
/// Archive paths are placed below `destination` (see [`path_below`]), which also serves as the
/// prefix for hardlink targets. Entries which would end up outside of `destination`, through
/// `..` components or symlinks extracted earlier, are refused. `callback` is called with every
/// entry's archive path before it is extracted. Failed entries go through `options.on_error`,
/// which by default aborts.
///
/// Returns the session so the caller can look at the tolerated errors.
pub fn extract_archive<S, F>(
    stream: &mut S,
    destination: &Path,
    options: ExtractOptions,
    mut callback: F,
) -> Result<Extractor, Error>
where
    S: BlockStream + ?Sized,
    F: FnMut(&Path),
{
    materialize_path(destination)
        .with_context(|| format!("error creating directory {destination:?}"))?;

    let mut on_error: ErrorHandler = match options.on_error {
        Some(on_error) => on_error,
        None => Box::new(Err),
    };
    let mut extractor = Extractor::new(options.flags);
    extractor.no_follow = true;

    loop {
        let header = match stream.next_header() {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(err) if InvalidEntry::is_invalid_entry(&err) => {
                on_error(Error::from(err))?;
                continue;
            }
            Err(err) => return Err(Error::from(err).context("error reading archive")),
        };

        callback(header.path());

        let target = path_below(destination, header.path())
            .ok_or_else(|| format_err!("path leaves the destination directory"))
            .and_then(|target| {
                check_confined(&extractor.hardlinks, destination, &header, &target)?;
                Ok(target)
            });

        let res = match target {
            Ok(target) => {
                match extractor.extract_entry(stream, &header, &target, Some(destination)) {
                    // keep the stream in sync for the following entries
                    Err(err) if err.is_already_exists() => {
                        extractor.skip_entry(stream, &header).and(Err(err))
                    }
                    res => res,
                }
            }
            Err(reason) => extractor.skip_entry(stream, &header).and_then(|()| {
                Err(ExtractError::entry(
                    ExtractContext::InvalidPath,
                    header.path(),
                    reason,
                ))
            }),
        };

        if let Err(err) = res {
            on_error(Error::from(err).context(format!("error at entry {:?}", header.path)))?;
        }
    }

    Ok(extractor)
}

/// Walk through an archive without extracting anything.
pub fn list_archive<S, F>(stream: &mut S, mut callback: F) -> Result<(), Error>
where
    S: BlockStream + ?Sized,
    F: FnMut(&Header),
{
    let mut extractor = Extractor::new(Flags::DEFAULT);

    while let Some(header) = stream.next_header().context("error reading archive")? {
        callback(&header);
        extractor.skip_entry(stream, &header)?;
    }

    Ok(())
}
