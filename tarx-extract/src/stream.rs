//! Sequential access to archive headers and data blocks.

use std::ffi::{CString, OsString};
use std::io::{self, Read};
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use tar::EntryType;

use crate::header::{Device, EntryKind, Header, Metadata};

/// Size of one archive data block. Entry data is always padded to a multiple of this.
pub const BLOCK_SIZE: usize = 512;

/// PAX records which may carry the SELinux context of an entry.
const SELINUX_PAX_KEYS: [&str; 2] = ["RHT.security.selinux", "SCHILY.xattr.security.selinux"];

/// A source of decoded entry headers and fixed size data blocks.
///
/// The data of a regular file follows its header as `ceil(size / BLOCK_SIZE)` blocks, the last
/// one padded. Readers must consume exactly that many blocks before asking for the next header.
pub trait BlockStream {
    /// Decode the next header, `None` marks the end of the archive.
    ///
    /// A header which was read but could not be decoded (for example because of an empty numeric
    /// field) is reported as an [`InvalidEntry`] error. The stream has then moved past that entry
    /// and its data, so the next call continues with the following entry. Any other error means
    /// the archive cannot be read any further.
    fn next_header(&mut self) -> io::Result<Option<Header>>;

    /// Read the next data block of the current entry.
    ///
    /// Returns the number of bytes read, anything short of `BLOCK_SIZE` means the archive is
    /// truncated.
    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> io::Result<usize>;
}

/// An entry whose header could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("invalid header for entry {path:?}")]
pub struct InvalidEntry {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl InvalidEntry {
    pub fn into_io_error(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }

    /// Check whether `err` was created from an [`InvalidEntry`].
    pub fn is_invalid_entry(err: &io::Error) -> bool {
        err.get_ref()
            .map_or(false, |inner| inner.is::<InvalidEntry>())
    }
}

impl<T: BlockStream + ?Sized> BlockStream for &mut T {
    fn next_header(&mut self) -> io::Result<Option<Header>> {
        (**self).next_header()
    }

    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> io::Result<usize> {
        (**self).read_block(block)
    }
}

impl<T: BlockStream + ?Sized> BlockStream for Box<T> {
    fn next_header(&mut self) -> io::Result<Option<Header>> {
        (**self).next_header()
    }

    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> io::Result<usize> {
        (**self).read_block(block)
    }
}

/// [`BlockStream`] on top of the entries of a [`tar::Archive`].
///
/// Header decoding (including GNU long names and PAX paths) is left to the `tar` crate, the
/// entry data is handed out again as zero padded blocks.
pub struct TarBlockStream<'a, R: 'a + Read> {
    entries: tar::Entries<'a, R>,
    current: Option<tar::Entry<'a, R>>,
    remaining: u64,
}

impl<'a, R: 'a + Read> TarBlockStream<'a, R> {
    pub fn new(archive: &'a mut tar::Archive<R>) -> io::Result<Self> {
        Ok(Self {
            entries: archive.entries()?,
            current: None,
            remaining: 0,
        })
    }
}

impl<'a, R: 'a + Read> BlockStream for TarBlockStream<'a, R> {
    fn next_header(&mut self) -> io::Result<Option<Header>> {
        // unread data of the previous entry is skipped by the tar crate
        self.current = None;
        self.remaining = 0;

        let mut entry = loop {
            let entry = match self.entries.next() {
                None => return Ok(None),
                Some(entry) => entry?,
            };

            // archive wide metadata, not something to extract
            let entry_type = entry.header().entry_type();
            if !(entry_type == EntryType::XGlobalHeader || entry_type == EntryType::new(b'V')) {
                break entry;
            }

            log::debug!(
                "skipping {:?} entry {:?}",
                entry_type,
                String::from_utf8_lossy(&entry.path_bytes()),
            );
        };

        let header = decode_entry(&mut entry).map_err(|source| {
            InvalidEntry {
                path: PathBuf::from(OsString::from_vec(entry.path_bytes().into_owned())),
                source,
            }
            .into_io_error()
        })?;
        self.remaining = header.data_size();
        self.current = Some(entry);

        Ok(Some(header))
    }

    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> io::Result<usize> {
        let entry = match self.current.as_mut() {
            Some(entry) => entry,
            None => return Ok(0),
        };

        let want = self.remaining.min(BLOCK_SIZE as u64) as usize;
        let mut got = 0;
        while got < want {
            match entry.read(&mut block[got..want]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        self.remaining -= got as u64;

        if got < want || want == 0 {
            return Ok(got);
        }

        block[got..].fill(0);
        Ok(BLOCK_SIZE)
    }
}

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn decode_entry<R: Read>(entry: &mut tar::Entry<R>) -> io::Result<Header> {
    let security_context = security_context(entry)?;

    let path = OsString::from_vec(entry.path_bytes().into_owned());
    let header = entry.header();

    let metadata = Metadata {
        mode: header.mode()?,
        uid: u32::try_from(header.uid()?).map_err(invalid_data)?,
        gid: u32::try_from(header.gid()?).map_err(invalid_data)?,
        mtime: i64::try_from(header.mtime()?).map_err(invalid_data)?,
        security_context,
    };

    let link_target = || -> io::Result<OsString> {
        entry
            .link_name_bytes()
            .map(|link| OsString::from_vec(link.into_owned()))
            .ok_or_else(|| invalid_data(format!("link entry {path:?} without target")))
    };

    let device = || -> io::Result<Device> {
        Ok(Device {
            major: u64::from(header.device_major()?.unwrap_or(0)),
            minor: u64::from(header.device_minor()?.unwrap_or(0)),
        })
    };

    let kind = match header.entry_type() {
        EntryType::Directory => EntryKind::Directory,
        EntryType::Symlink => EntryKind::Symlink(link_target()?),
        EntryType::Link => EntryKind::Hardlink(link_target()?),
        EntryType::Char => EntryKind::CharDevice(device()?),
        EntryType::Block => EntryKind::BlockDevice(device()?),
        EntryType::Fifo => EntryKind::Fifo,
        // everything else carries its data like a regular file
        _ => EntryKind::File { size: entry.size() },
    };

    Ok(Header {
        path,
        kind,
        metadata,
    })
}

fn security_context<R: Read>(entry: &mut tar::Entry<R>) -> io::Result<Option<CString>> {
    let extensions = match entry.pax_extensions()? {
        Some(extensions) => extensions,
        None => return Ok(None),
    };

    for extension in extensions {
        let extension = extension?;
        let key = match extension.key() {
            Ok(key) => key,
            Err(_) => continue,
        };

        if SELINUX_PAX_KEYS.contains(&key) {
            let value = extension.value_bytes();
            let value = value.split(|b| *b == 0).next().unwrap_or_default();
            if value.is_empty() {
                return Ok(None);
            }
            return CString::new(value).map(Some).map_err(invalid_data);
        }
    }

    Ok(None)
}
