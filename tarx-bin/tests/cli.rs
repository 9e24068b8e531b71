use std::path::Path;
use std::process::Command;

fn build_archive(path: &Path) {
    let file = std::fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(file);

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_mode(0o755);
    header.set_uid(0);
    header.set_gid(0);
    header.set_size(0);
    header.set_mtime(1_600_000_000);
    header.set_cksum();
    builder
        .append_data(&mut header, "data", std::io::empty())
        .unwrap();

    let contents = b"hello tarx\n";
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_size(contents.len() as u64);
    header.set_mtime(1_600_000_000);
    header.set_cksum();
    builder
        .append_data(&mut header, "data/hello.txt", &contents[..])
        .unwrap();

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_mode(0o777);
    header.set_uid(0);
    header.set_gid(0);
    header.set_size(0);
    header.set_mtime(1_600_000_000);
    header.set_link_name("hello.txt").unwrap();
    header.set_cksum();
    builder
        .append_data(&mut header, "data/link", std::io::empty())
        .unwrap();

    builder.into_inner().unwrap();
}

// Extract an archive with the command line tool and compare the result
#[test]
fn tarx_extract() {
    let exec_path = env!("CARGO_BIN_EXE_tarx");

    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("archive.tar");
    let dest_dir = tmp.path().join("dest");
    build_archive(&archive);

    println!("run '{} extract {:?} {:?}'", exec_path, archive, dest_dir);

    let status = Command::new(exec_path)
        .arg("extract")
        .arg(&archive)
        .arg(&dest_dir)
        .status()
        .unwrap_or_else(|err| panic!("Failed to invoke '{}': {}", exec_path, err));
    assert!(status.success());

    assert_eq!(
        std::fs::read(dest_dir.join("data/hello.txt")).unwrap(),
        b"hello tarx\n"
    );
    assert_eq!(
        std::fs::read_link(dest_dir.join("data/link")).unwrap(),
        Path::new("hello.txt")
    );

    // a second run is refused entry by entry with overwrite protection
    let status = Command::new(exec_path)
        .arg("extract")
        .arg(&archive)
        .arg(&dest_dir)
        .arg("--no-overwrite")
        .status()
        .unwrap_or_else(|err| panic!("Failed to invoke '{}': {}", exec_path, err));
    assert!(!status.success());
}

#[test]
fn tarx_list() {
    let exec_path = env!("CARGO_BIN_EXE_tarx");

    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("archive.tar");
    build_archive(&archive);

    let output = Command::new(exec_path)
        .arg("list")
        .arg(&archive)
        .env("TARX_LOG", "info")
        .output()
        .unwrap_or_else(|err| panic!("Failed to invoke '{}': {}", exec_path, err));
    assert!(output.status.success());

    let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
    log.push_str(&String::from_utf8_lossy(&output.stderr));
    assert!(log.contains("\"data/hello.txt\""), "unexpected output: {log}");
    assert!(log.contains("\"data/link\""), "unexpected output: {log}");
}
