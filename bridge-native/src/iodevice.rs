//! Random-access devices: an in-memory buffer, a file and a temporary file.
//!
//! Both report failures the toolkit way: a `bool` or `-1` return, with the
//! reason kept in the device's error string until the next failure.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bridge_traits::ffi::{ByteView, OpenMode};
use tracing::{debug, warn};

use crate::bytearray::{write_bytes, NativeByteArray};

const UNKNOWN_ERROR: &str = "Unknown error";
const PLACEHOLDER: &str = "XXXXXX";

/// Name pattern of a temporary file that has not been created yet.
struct TempState {
    template: String,
    auto_remove: bool,
}

enum Backend {
    Buffer { data: NativeByteArray },
    /// A temporary file has an empty `path` until its first open.
    File {
        path: PathBuf,
        file: Option<fs::File>,
        temp: Option<TempState>,
    },
}

pub struct NativeIoDevice {
    backend: Backend,
    mode: OpenMode,
    pos: u64,
    error: String,
}

impl NativeIoDevice {
    fn new(backend: Backend) -> Self {
        Self {
            backend,
            mode: OpenMode::NOT_OPEN,
            pos: 0,
            error: UNKNOWN_ERROR.to_string(),
        }
    }

    fn fail(&mut self, message: impl Into<String>) -> bool {
        self.error = message.into();
        debug!(error = %self.error, "Device operation failed");
        false
    }

    pub fn is_open(&self) -> bool {
        self.mode != OpenMode::NOT_OPEN
    }

    fn readable(&self) -> bool {
        self.mode.contains(OpenMode::READ_ONLY)
    }

    fn writable(&self) -> bool {
        self.mode.contains(OpenMode::WRITE_ONLY)
    }

    pub fn open(&mut self, mut mode: OpenMode) -> bool {
        if self.is_open() {
            return self.fail("Device already open");
        }
        if mode.intersects(OpenMode::APPEND | OpenMode::TRUNCATE) {
            mode |= OpenMode::WRITE_ONLY;
        }
        if !mode.intersects(OpenMode::READ_WRITE) {
            return self.fail("Device access not specified");
        }

        let opened = match &mut self.backend {
            Backend::Buffer { data } => {
                if mode.contains(OpenMode::TRUNCATE) {
                    data.make_mut().bytes.clear();
                }
                Ok(data.bytes.len() as u64)
            }
            Backend::File {
                path,
                file,
                temp: Some(temp),
            } if path.as_os_str().is_empty() => create_temp(&temp.template).map(|(opened, created)| {
                debug!(path = %created.display(), "Created temporary file");
                *path = created;
                *file = Some(opened);
                0
            }),
            Backend::File { path, file, .. } => {
                let write = mode.contains(OpenMode::WRITE_ONLY);
                // Write-only implies truncation unless appending or reading.
                let truncate = mode.contains(OpenMode::TRUNCATE)
                    || (write
                        && !mode.intersects(
                            OpenMode::READ_ONLY | OpenMode::APPEND | OpenMode::NEW_ONLY,
                        ));
                let mut options = OpenOptions::new();
                options
                    .read(mode.contains(OpenMode::READ_ONLY))
                    .write(write)
                    .append(mode.contains(OpenMode::APPEND))
                    .truncate(truncate && !mode.contains(OpenMode::APPEND));
                if mode.contains(OpenMode::NEW_ONLY) {
                    options.create_new(true);
                } else if write && !mode.contains(OpenMode::EXISTING_ONLY) {
                    options.create(true);
                }

                options.open(&*path).map(|opened| {
                    let size = opened.metadata().map(|meta| meta.len()).unwrap_or(0);
                    *file = Some(opened);
                    size
                })
            }
        };
        let size = match opened {
            Ok(size) => size,
            Err(err) => return self.fail(err.to_string()),
        };

        self.mode = mode;
        self.pos = if mode.contains(OpenMode::APPEND) { size } else { 0 };
        true
    }

    pub fn close(&mut self) {
        if let Backend::File { file, .. } = &mut self.backend {
            if let Some(mut open) = file.take() {
                if let Err(err) = open.flush() {
                    warn!(error = %err, "Flush on close failed");
                }
            }
        }
        self.mode = OpenMode::NOT_OPEN;
        self.pos = 0;
    }

    pub fn size(&self) -> u64 {
        match &self.backend {
            Backend::Buffer { data } => data.bytes.len() as u64,
            Backend::File { path, file, .. } => match file {
                Some(open) => open.metadata().map(|meta| meta.len()).unwrap_or(0),
                None => fs::metadata(path).map(|meta| meta.len()).unwrap_or(0),
            },
        }
    }

    pub fn seek(&mut self, pos: i64) -> bool {
        if !self.is_open() {
            return self.fail("Device not open");
        }
        let Ok(pos) = u64::try_from(pos) else {
            return self.fail("Invalid pos");
        };
        let writable = self.writable();
        let result = match &mut self.backend {
            Backend::Buffer { data } => {
                let len = data.bytes.len() as u64;
                // Past the end only moves the cursor; the gap is zero-filled by the next write.
                if pos > len && !writable {
                    Err("Invalid pos".to_string())
                } else {
                    Ok(())
                }
            }
            Backend::File { file, .. } => match file.as_mut() {
                Some(open) => open
                    .seek(SeekFrom::Start(pos))
                    .map(|_| ())
                    .map_err(|err| err.to_string()),
                None => Err("Device not open".to_string()),
            },
        };
        match result {
            Ok(()) => {
                self.pos = pos;
                true
            }
            Err(message) => self.fail(message),
        }
    }

    pub fn at_end(&self) -> bool {
        !self.is_open() || self.pos >= self.size()
    }

    /// Bytes read, `0` at the end, `-1` on failure.
    pub fn read(&mut self, buf: &mut [u8]) -> i64 {
        if !self.is_open() {
            self.fail("Device not open");
            return -1;
        }
        if !self.readable() {
            self.fail("WriteOnly device");
            return -1;
        }
        let pos = self.pos;
        let result = match &mut self.backend {
            Backend::Buffer { data } => {
                let bytes = &data.bytes;
                let start = usize::try_from(pos).unwrap_or(usize::MAX).min(bytes.len());
                let count = buf.len().min(bytes.len() - start);
                buf[..count].copy_from_slice(&bytes[start..start + count]);
                Ok(count)
            }
            Backend::File { file, .. } => match file.as_mut() {
                Some(open) => open.read(buf),
                None => Err(io::Error::new(io::ErrorKind::NotConnected, "Device not open")),
            },
        };
        match result {
            Ok(count) => {
                self.pos += count as u64;
                count as i64
            }
            Err(err) => {
                self.fail(err.to_string());
                -1
            }
        }
    }

    /// Bytes written or `-1`.
    pub fn write(&mut self, buf: &[u8]) -> i64 {
        if !self.is_open() {
            self.fail("Device not open");
            return -1;
        }
        if !self.writable() {
            self.fail("ReadOnly device");
            return -1;
        }
        let pos = self.pos;
        let result = match &mut self.backend {
            Backend::Buffer { data } => grow_and_write(&mut data.make_mut().bytes, pos, buf),
            Backend::File { file, .. } => match file.as_mut() {
                Some(open) => open.write_all(buf).map(|()| buf.len()),
                None => Err(io::Error::new(io::ErrorKind::NotConnected, "Device not open")),
            },
        };
        match result {
            Ok(count) => {
                self.pos += count as u64;
                count as i64
            }
            Err(err) => {
                self.fail(err.to_string());
                -1
            }
        }
    }
}

/// Creates a fresh file from `template`, whose last `XXXXXX` run becomes
/// the unique part. A template without one gets `.XXXXXX` appended.
fn create_temp(template: &str) -> io::Result<(fs::File, PathBuf)> {
    let template = Path::new(template);
    let dir = match template.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = template
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (prefix, suffix) = match name.rfind(PLACEHOLDER) {
        Some(at) => (name[..at].to_string(), name[at + PLACEHOLDER.len()..].to_string()),
        None => (format!("{name}."), String::new()),
    };

    let (file, path) = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .rand_bytes(PLACEHOLDER.len())
        .tempfile_in(dir)?
        .into_parts();
    // Removal follows the device's auto-remove flag, not the guard.
    let path = path.keep().map_err(|err| err.error)?;
    Ok((file, path))
}

fn default_template() -> String {
    std::env::temp_dir()
        .join(format!("netbridge.{PLACEHOLDER}"))
        .to_string_lossy()
        .into_owned()
}

fn grow_and_write(bytes: &mut Vec<u8>, pos: u64, buf: &[u8]) -> io::Result<usize> {
    let range = usize::try_from(pos)
        .ok()
        .and_then(|start| Some(start..start.checked_add(buf.len())?))
        .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "Buffer position out of range"))?;
    if range.end > bytes.len() {
        bytes
            .try_reserve(range.end - bytes.len())
            .map_err(|err| io::Error::new(io::ErrorKind::OutOfMemory, err))?;
        bytes.resize(range.end, 0);
    }
    bytes[range].copy_from_slice(buf);
    Ok(buf.len())
}

#[no_mangle]
pub extern "C" fn netbridge_buffer_new() -> *mut NativeIoDevice {
    Box::into_raw(Box::new(NativeIoDevice::new(Backend::Buffer {
        data: NativeByteArray::default(),
    })))
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_file_new(path: ByteView) -> *mut NativeIoDevice {
    let path = PathBuf::from(String::from_utf8_lossy(path.as_slice()).into_owned());
    Box::into_raw(Box::new(NativeIoDevice::new(Backend::File {
        path,
        file: None,
        temp: None,
    })))
}

/// An empty template means `netbridge.XXXXXX` in the system temp directory.
/// A relative template resolves against the working directory.
#[no_mangle]
pub unsafe extern "C" fn netbridge_temporaryfile_new(template: ByteView) -> *mut NativeIoDevice {
    let template = match template.as_slice() {
        [] => default_template(),
        bytes => String::from_utf8_lossy(bytes).into_owned(),
    };
    Box::into_raw(Box::new(NativeIoDevice::new(Backend::File {
        path: PathBuf::new(),
        file: None,
        temp: Some(TempState {
            template,
            auto_remove: true,
        }),
    })))
}

/// Closes the device and removes an auto-remove temporary file.
#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_delete(device: *mut NativeIoDevice) {
    if device.is_null() {
        return;
    }
    let mut device = Box::from_raw(device);
    device.close();
    if let Backend::File {
        path,
        temp: Some(TempState { auto_remove: true, .. }),
        ..
    } = &device.backend
    {
        if path.as_os_str().is_empty() {
            return;
        }
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "Could not remove temporary file"),
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_open(device: *mut NativeIoDevice, mode: OpenMode) -> bool {
    (*device).open(mode)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_close(device: *mut NativeIoDevice) {
    (*device).close();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_is_open(device: *const NativeIoDevice) -> bool {
    (*device).is_open()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_open_mode(device: *const NativeIoDevice) -> OpenMode {
    (*device).mode
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_size(device: *const NativeIoDevice) -> i64 {
    (*device).size() as i64
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_pos(device: *const NativeIoDevice) -> i64 {
    (*device).pos as i64
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_seek(device: *mut NativeIoDevice, pos: i64) -> bool {
    (*device).seek(pos)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_at_end(device: *const NativeIoDevice) -> bool {
    (*device).at_end()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_read(
    device: *mut NativeIoDevice,
    data: *mut u8,
    max_size: usize,
) -> i64 {
    if data.is_null() {
        return 0;
    }
    (*device).read(std::slice::from_raw_parts_mut(data, max_size))
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_write(device: *mut NativeIoDevice, data: ByteView) -> i64 {
    (*device).write(data.as_slice())
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_iodevice_error_string(
    device: *const NativeIoDevice,
    out: *mut NativeByteArray,
) {
    write_bytes(out, (*device).error.as_bytes());
}

/// Shares the buffer contents; empty for a file.
#[no_mangle]
pub unsafe extern "C" fn netbridge_buffer_data(device: *const NativeIoDevice, out: *mut NativeByteArray) {
    match &(*device).backend {
        Backend::Buffer { data } => out.write(data.clone()),
        Backend::File { .. } => write_bytes(out, Vec::new()),
    }
}

/// Replaces the buffer contents; refused while the buffer is open.
#[no_mangle]
pub unsafe extern "C" fn netbridge_buffer_set_data(device: *mut NativeIoDevice, bytes: ByteView) -> bool {
    let device = &mut *device;
    if device.is_open() {
        return device.fail("Cannot replace the data of an open buffer");
    }
    if let Backend::Buffer { data } = &mut device.backend {
        *data = NativeByteArray::from_vec(bytes.as_slice().to_vec());
        return true;
    }
    device.fail("Not a buffer")
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_file_file_name(device: *const NativeIoDevice, out: *mut NativeByteArray) {
    match &(*device).backend {
        Backend::File { path, .. } => write_bytes(out, path.to_string_lossy().as_bytes()),
        Backend::Buffer { .. } => write_bytes(out, Vec::new()),
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_file_exists(device: *const NativeIoDevice) -> bool {
    match &(*device).backend {
        Backend::File { path, .. } => path.exists(),
        Backend::Buffer { .. } => false,
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_file_exists_path(path: ByteView) -> bool {
    PathBuf::from(String::from_utf8_lossy(path.as_slice()).into_owned()).exists()
}

/// Closes the file, then removes it from disk.
#[no_mangle]
pub unsafe extern "C" fn netbridge_file_remove(device: *mut NativeIoDevice) -> bool {
    let device = &mut *device;
    device.close();
    let result = match &device.backend {
        Backend::File { path, .. } => fs::remove_file(path).map_err(|err| err.to_string()),
        Backend::Buffer { .. } => Err("Not a file".to_string()),
    };
    match result {
        Ok(()) => true,
        Err(message) => device.fail(message),
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_file_flush(device: *mut NativeIoDevice) -> bool {
    let device = &mut *device;
    let result = match &mut device.backend {
        Backend::File { file: Some(open), .. } => open.flush().map_err(|err| err.to_string()),
        Backend::File { file: None, .. } => Err("Device not open".to_string()),
        Backend::Buffer { .. } => Ok(()),
    };
    match result {
        Ok(()) => true,
        Err(message) => device.fail(message),
    }
}

fn temp_state(device: &mut NativeIoDevice) -> Option<&mut TempState> {
    match &mut device.backend {
        Backend::File { temp, .. } => temp.as_mut(),
        Backend::Buffer { .. } => None,
    }
}

/// Opens read-write, creating the file on first use. Reopening after a
/// close opens the same file. Already open counts as success.
#[no_mangle]
pub unsafe extern "C" fn netbridge_temporaryfile_open(device: *mut NativeIoDevice) -> bool {
    let device = &mut *device;
    device.is_open() || device.open(OpenMode::READ_WRITE)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_temporaryfile_auto_remove(device: *mut NativeIoDevice) -> bool {
    temp_state(&mut *device).is_some_and(|temp| temp.auto_remove)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_temporaryfile_set_auto_remove(device: *mut NativeIoDevice, enable: bool) {
    if let Some(temp) = temp_state(&mut *device) {
        temp.auto_remove = enable;
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_temporaryfile_file_template(
    device: *mut NativeIoDevice,
    out: *mut NativeByteArray,
) {
    match temp_state(&mut *device) {
        Some(temp) => write_bytes(out, temp.template.as_bytes()),
        None => write_bytes(out, Vec::new()),
    }
}

/// Only affects a file that has not been created yet.
#[no_mangle]
pub unsafe extern "C" fn netbridge_temporaryfile_set_file_template(device: *mut NativeIoDevice, template: ByteView) {
    if let Some(temp) = temp_state(&mut *device) {
        temp.template = String::from_utf8_lossy(template.as_slice()).into_owned();
    }
}

/// Closes the file and moves it to `new_name` with a single rename, so the
/// target must be on the same filesystem. A renamed file is no longer
/// temporary and survives the device.
#[no_mangle]
pub unsafe extern "C" fn netbridge_temporaryfile_rename(device: *mut NativeIoDevice, new_name: ByteView) -> bool {
    let device = &mut *device;
    device.close();
    let new_path = PathBuf::from(String::from_utf8_lossy(new_name.as_slice()).into_owned());
    let result = match &mut device.backend {
        Backend::File { path, temp, .. } if !path.as_os_str().is_empty() => {
            fs::rename(&*path, &new_path).map(|()| {
                *path = new_path;
                *temp = None;
            })
        }
        Backend::File { .. } => Err(io::Error::new(io::ErrorKind::NotFound, "The file has not been created")),
        Backend::Buffer { .. } => Err(io::Error::new(io::ErrorKind::InvalidInput, "Not a file")),
    };
    match result {
        Ok(()) => true,
        Err(err) => device.fail(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> NativeIoDevice {
        NativeIoDevice::new(Backend::Buffer {
            data: NativeByteArray::default(),
        })
    }

    #[test]
    fn test_buffer_write_seek_read() {
        let mut device = buffer();
        assert!(device.open(OpenMode::READ_WRITE));
        assert_eq!(device.write(b"hello world"), 11);
        assert!(device.at_end());
        assert!(device.seek(6));

        let mut out = [0u8; 16];
        assert_eq!(device.read(&mut out), 5);
        assert_eq!(&out[..5], b"world");
        assert_eq!(device.read(&mut out), 0);
    }

    #[test]
    fn test_seek_past_end_defers_growth() {
        let mut device = buffer();
        assert!(device.open(OpenMode::READ_WRITE));

        assert!(device.seek(1 << 62));
        assert_eq!(device.size(), 0);
        assert!(device.at_end());
        assert_eq!(device.read(&mut [0u8; 4]), 0);
        assert_eq!(device.write(b"x"), -1);
        assert_eq!(device.size(), 0);

        assert!(device.seek(3));
        assert_eq!(device.write(b"x"), 1);
        let Backend::Buffer { data } = &device.backend else { unreachable!() };
        assert_eq!(data.bytes, b"\0\0\0x");
    }

    #[test]
    fn test_buffer_rejects_unspecified_access() {
        let mut device = buffer();
        assert!(!device.open(OpenMode::TEXT));
        assert_eq!(device.error, "Device access not specified");
        assert_eq!(device.read(&mut [0u8; 4]), -1);
        assert_eq!(device.error, "Device not open");
    }

    #[test]
    fn test_read_only_buffer_refuses_writes() {
        let mut device = buffer();
        assert!(device.open(OpenMode::READ_ONLY));
        assert_eq!(device.write(b"x"), -1);
        assert_eq!(device.error, "ReadOnly device");
        assert!(!device.seek(10));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut device = NativeIoDevice::new(Backend::File {
            path: path.clone(),
            file: None,
            temp: None,
        });

        assert!(device.open(OpenMode::WRITE_ONLY));
        assert_eq!(device.write(b"abc"), 3);
        device.close();
        assert_eq!(device.size(), 3);

        assert!(device.open(OpenMode::APPEND));
        assert_eq!(device.pos, 3);
        device.write(b"def");
        device.close();
        assert_eq!(fs::read(&path).unwrap(), b"abcdef");

        let mut missing = NativeIoDevice::new(Backend::File {
            path: dir.path().join("missing"),
            file: None,
            temp: None,
        });
        assert!(!missing.open(OpenMode::READ_ONLY));
        assert_ne!(missing.error, UNKNOWN_ERROR);
    }

    fn path_of(device: &NativeIoDevice) -> PathBuf {
        match &device.backend {
            Backend::File { path, .. } => path.clone(),
            Backend::Buffer { .. } => PathBuf::new(),
        }
    }

    fn view(path: &Path) -> ByteView {
        ByteView::from_slice(path.as_os_str().as_encoded_bytes())
    }

    #[test]
    fn test_temporary_file_created_on_open_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("session-XXXXXX.log");
        unsafe {
            let device = netbridge_temporaryfile_new(view(&template));
            assert!(path_of(&*device).as_os_str().is_empty());
            assert!(netbridge_temporaryfile_open(device));
            assert!(netbridge_temporaryfile_open(device));

            let path = path_of(&*device);
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("session-") && name.ends_with(".log"), "{name}");
            assert_eq!(name.len(), "session-XXXXXX.log".len());
            assert_eq!((*device).write(b"data"), 4);

            // Reopening after a close reuses the same file.
            (*device).close();
            assert!(netbridge_temporaryfile_open(device));
            assert_eq!(path_of(&*device), path);
            assert_eq!((*device).size(), 4);

            netbridge_iodevice_delete(device);
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_temporary_file_rename_materializes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("final.txt");
        unsafe {
            let device = netbridge_temporaryfile_new(view(&dir.path().join("plain")));
            assert!(!netbridge_temporaryfile_rename(device, view(&target)));
            assert_eq!((*device).error, "The file has not been created");

            assert!(netbridge_temporaryfile_open(device));
            let created = path_of(&*device);
            assert!(created.file_name().unwrap().to_string_lossy().starts_with("plain."));
            assert_eq!((*device).write(b"done"), 4);

            assert!(netbridge_temporaryfile_rename(device, view(&target)));
            assert!(!created.exists());
            assert!(!netbridge_temporaryfile_auto_remove(device));
            netbridge_iodevice_delete(device);
            assert_eq!(fs::read(&target).unwrap(), b"done");
        }
    }
}
