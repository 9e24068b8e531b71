//! Some common methods used within the extraction code.

use crate::header::{EntryKind, Header};

#[rustfmt::skip]
fn symbolic_mode(c: u32, special: bool, special_x: u8, special_no_x: u8) -> [u8; 3] {
    [
        if 0 != c & 4 { b'r' } else { b'-' },
        if 0 != c & 2 { b'w' } else { b'-' },
        match (c & 1, special) {
            (0, false) => b'-',
            (0, true) => special_no_x,
            (_, false) => b'x',
            (_, true) => special_x,
        }
    ]
}

fn mode_string(header: &Header) -> String {
    // https://www.gnu.org/software/coreutils/manual/html_node/What-information-is-listed.html#What-information-is-listed
    // additionally we use:
    //     file type capital 'L' hard links
    //     a '+' after the mode to show a recorded SELinux context
    //
    // Trwxrwxrwx+ uid/gid size mtime filename [-> destination]

    let meta = header.metadata();
    let mode = meta.mode;
    let type_char = match header.kind() {
        EntryKind::File { .. } => '-',
        EntryKind::Directory => 'd',
        EntryKind::Symlink(_) => 'l',
        EntryKind::Hardlink(_) => 'L',
        EntryKind::CharDevice(_) => 'c',
        EntryKind::BlockDevice(_) => 'b',
        EntryKind::Fifo => 'p',
    };

    let fmt_u = symbolic_mode((mode >> 6) & 7, 0 != mode & libc::S_ISUID, b's', b'S');
    let fmt_g = symbolic_mode((mode >> 3) & 7, 0 != mode & libc::S_ISGID, b's', b'S');
    let fmt_o = symbolic_mode(mode & 7, 0 != mode & libc::S_ISVTX, b't', b'T');

    let has_context = if meta.security_context.is_some() { '+' } else { ' ' };

    format!(
        "{}{}{}{}{}",
        type_char,
        String::from_utf8_lossy(&fmt_u),
        String::from_utf8_lossy(&fmt_g),
        String::from_utf8_lossy(&fmt_o),
        has_context,
    )
}

fn format_mtime(mtime: i64) -> String {
    if let Ok(s) = proxmox_time::strftime_local("%Y-%m-%d %H:%M:%S", mtime) {
        return s;
    }
    format!("{}", mtime)
}

/// Format a header like one line of `ls -l`.
pub fn format_single_line_entry(header: &Header) -> String {
    let mode_string = mode_string(header);

    let meta = header.metadata();

    let (size, link) = match header.kind() {
        EntryKind::File { size } => (format!("{}", *size), String::new()),
        EntryKind::Symlink(link) => ("0".to_string(), format!(" -> {:?}", link)),
        EntryKind::Hardlink(link) => ("0".to_string(), format!(" -> {:?}", link)),
        EntryKind::CharDevice(dev) | EntryKind::BlockDevice(dev) => {
            (format!("{},{}", dev.major, dev.minor), String::new())
        }
        _ => ("0".to_string(), String::new()),
    };

    let owner_string = format!("{}/{}", meta.uid, meta.gid);

    format!(
        "{} {:<13} {} {:>8} {:?}{}",
        mode_string,
        owner_string,
        format_mtime(meta.mtime),
        size,
        header.path(),
        link,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::header::Metadata;

    #[test]
    fn test_mode_string() {
        let header = Header::new(
            "bin/su",
            EntryKind::File { size: 10 },
            Metadata::new(0o4755, 0, 0, 0),
        );
        assert_eq!(mode_string(&header), "-rwsr-xr-x ");

        let header = Header::new("tmp", EntryKind::Directory, Metadata::new(0o1777, 0, 0, 0));
        assert_eq!(mode_string(&header), "drwxrwxrwt ");

        let header = Header::new(
            "data/link",
            EntryKind::Hardlink("data/file".into()),
            Metadata::new(0o640, 0, 0, 0),
        );
        assert_eq!(mode_string(&header), "Lrw-r----- ");
    }

    #[test]
    fn test_format_single_line_entry_link() {
        let header = Header::new(
            "etc/localtime",
            EntryKind::Symlink("../usr/share/zoneinfo/UTC".into()),
            Metadata::new(0o777, 0, 0, 0),
        );
        let line = format_single_line_entry(&header);
        assert!(line.starts_with("lrwxrwxrwx  0/0 "));
        assert!(line.ends_with("\"etc/localtime\" -> \"../usr/share/zoneinfo/UTC\""));
    }
}
