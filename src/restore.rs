//! Restore workflow: open an archive, extract it and account for the outcome.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Error};
use flate2::bufread::MultiGzDecoder;

use tarx_extract::{
    extract_archive, list_archive, ErrorHandler, ExtractOptions, Flags, Header, TarBlockStream,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Clone, Copy, Debug, Default)]
pub struct RestoreOptions {
    pub flags: Flags,
    /// Abort on the first failed entry. Otherwise failures are logged and counted.
    pub strict: bool,
}

/// Outcome of a restore run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Number of entries found in the archive.
    pub entries: usize,
    /// Entries which could not be restored.
    pub failed: usize,
    /// Hardlinks, device nodes and security labels which could not be restored without failing
    /// their entry.
    pub tolerated: usize,
}

impl RestoreSummary {
    pub fn is_ok(&self) -> bool {
        self.failed == 0
    }
}

/// Open an archive file, `"-"` reads from stdin.
pub fn open_archive(archive: &str) -> Result<Box<dyn Read>, Error> {
    if archive == "-" {
        return Ok(Box::new(io::stdin()));
    }

    log::debug!("opening archive {}", archive);
    let file = File::open(archive).with_context(|| format!("unable to open archive {archive:?}"))?;
    Ok(Box::new(file))
}

/// Transparently decompress gzip compressed archives.
pub fn decompress<'a, R: Read + 'a>(reader: R) -> io::Result<Box<dyn Read + 'a>> {
    let mut reader = BufReader::new(reader);

    if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
        log::debug!("archive is gzip compressed");
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Extract the archive read from `reader` below `target`.
///
/// `callback` sees the archive path of every entry before it is extracted.
pub fn restore_archive<R, F>(
    reader: R,
    target: &Path,
    options: RestoreOptions,
    mut callback: F,
) -> Result<RestoreSummary, Error>
where
    R: Read,
    F: FnMut(&Path),
{
    let mut archive = tar::Archive::new(decompress(reader)?);
    let mut stream = TarBlockStream::new(&mut archive).context("error reading archive")?;

    let failed = Arc::new(AtomicUsize::new(0));
    let on_error = if options.strict {
        // by default errors are propagated up
        None
    } else {
        let failed = Arc::clone(&failed);
        // otherwise we want to log them but not act on them
        Some(Box::new(move |err: Error| {
            failed.fetch_add(1, Ordering::AcqRel);
            log::error!("error: {:#}", err);
            Ok(())
        }) as ErrorHandler)
    };

    let mut entries = 0;
    let extractor = extract_archive(
        &mut stream,
        target,
        ExtractOptions {
            flags: options.flags,
            on_error,
        },
        |path| {
            entries += 1;
            callback(path);
        },
    )?;

    Ok(RestoreSummary {
        entries,
        failed: failed.load(Ordering::Acquire),
        tolerated: extractor.tolerated_errors().len(),
    })
}

/// Call `callback` with every header of the archive read from `reader`.
pub fn list_contents<R, F>(reader: R, callback: F) -> Result<(), Error>
where
    R: Read,
    F: FnMut(&Header),
{
    let mut archive = tar::Archive::new(decompress(reader)?);
    let mut stream = TarBlockStream::new(&mut archive).context("error reading archive")?;

    list_archive(&mut stream, callback)
}
