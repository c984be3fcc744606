use std::io::{Read, Seek, SeekFrom, Write};

use anyhow::Result;
use bridge_traits::ffi::OpenMode;
use core_io::{Buffer, File, TemporaryFile};

#[test]
fn test_file_write_then_read_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notes.txt");

    let mut file = File::new(&path);
    assert!(!file.exists());
    file.open(OpenMode::WRITE_ONLY)?;
    file.write_all(b"first line\nsecond line\n")?;
    file.flush()?;
    file.close();
    assert!(File::exists_path(&path));
    assert_eq!(file.size(), 23);

    file.open(OpenMode::READ_ONLY)?;
    file.seek(SeekFrom::Start(11))?;
    let mut rest = String::new();
    file.read_to_string(&mut rest)?;
    assert_eq!(rest, "second line\n");
    assert!(file.at_end());

    let err = file.write(b"nope").unwrap_err();
    assert_eq!(err.to_string(), "ReadOnly device");
    Ok(())
}

#[test]
fn test_append_and_remove() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log.txt");
    std::fs::write(&path, b"a")?;

    let mut file = File::new(&path);
    file.open(OpenMode::APPEND)?;
    assert_eq!(file.pos(), 1);
    file.write_all(b"bc")?;
    file.close();
    assert_eq!(std::fs::read(&path)?, b"abc");

    file.remove()?;
    assert!(!path.exists());
    assert!(file.remove().is_err());
    Ok(())
}

#[test]
fn test_missing_file_reports_os_error() {
    let mut file = File::new("/nonexistent/dir/file.bin");
    let err = file.open(OpenMode::READ_ONLY).unwrap_err();
    assert_eq!(err.to_string(), file.error_string());
    assert!(!file.is_open());
}

#[test]
fn test_buffer_far_seek_fails_on_write_not_seek() -> Result<()> {
    let mut buffer = Buffer::new();
    buffer.open(OpenMode::READ_WRITE)?;

    assert_eq!(buffer.seek(SeekFrom::Start(1 << 62))?, 1 << 62);
    assert_eq!(buffer.size(), 0);
    assert!(buffer.write(b"x").is_err());

    buffer.seek(SeekFrom::Start(2))?;
    buffer.write_all(b"yz")?;
    assert_eq!(buffer.data().as_slice(), b"\0\0yz");
    Ok(())
}

#[test]
fn test_temporary_file_is_removed_on_drop() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut temp = TemporaryFile::with_template(dir.path().join("upload-XXXXXX.part"));
    assert!(temp.auto_remove());
    assert!(temp.file_name().is_empty());

    temp.open()?;
    let name = temp.file_name();
    assert!(name.ends_with(".part"), "{name}");
    assert!(!name.contains("XXXXXX"));
    temp.write_all(b"chunk")?;
    temp.seek(SeekFrom::Start(0))?;
    let mut back = String::new();
    temp.read_to_string(&mut back)?;
    assert_eq!(back, "chunk");

    drop(temp);
    assert!(!File::exists_path(&name));
    Ok(())
}

#[test]
fn test_temporary_file_kept_or_renamed() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let mut kept = TemporaryFile::with_template(dir.path().join("kept"));
    kept.set_auto_remove(false);
    kept.open()?;
    let kept_name = kept.file_name();
    drop(kept);
    assert!(File::exists_path(&kept_name));

    let target = dir.path().join("report.txt");
    let mut renamed = TemporaryFile::new();
    renamed.set_file_template(dir.path().join("report-XXXXXX"));
    assert!(renamed.file_template().ends_with("report-XXXXXX"));
    renamed.open()?;
    renamed.write_all(b"final")?;
    renamed.rename(&target)?;
    drop(renamed);
    assert_eq!(std::fs::read(&target)?, b"final");
    Ok(())
}
