//! Random-access devices backed by memory, a file or a temporary file.
//!
//! Failures surface as [`io::Error`]s carrying the device's error string.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;

use bridge_traits::ffi::{ByteView, OpenMode};
use tracing::debug;

use crate::bytearray::{string_from, ByteArray};
use crate::util::{construct, owned_object};

owned_object! {
    /// A sequential or random-access device. Closed when dropped.
    pub struct IoDevice(RawIoDevice) {
        delete: netbridge_iodevice_delete,
    }
}

extern "C" {
    fn netbridge_buffer_new() -> *mut RawIoDevice;
    fn netbridge_file_new(path: ByteView) -> *mut RawIoDevice;
    fn netbridge_iodevice_open(device: *mut RawIoDevice, mode: OpenMode) -> bool;
    fn netbridge_iodevice_close(device: *mut RawIoDevice);
    fn netbridge_iodevice_is_open(device: *const RawIoDevice) -> bool;
    fn netbridge_iodevice_open_mode(device: *const RawIoDevice) -> OpenMode;
    fn netbridge_iodevice_size(device: *const RawIoDevice) -> i64;
    fn netbridge_iodevice_pos(device: *const RawIoDevice) -> i64;
    fn netbridge_iodevice_seek(device: *mut RawIoDevice, pos: i64) -> bool;
    fn netbridge_iodevice_at_end(device: *const RawIoDevice) -> bool;
    fn netbridge_iodevice_read(device: *mut RawIoDevice, data: *mut u8, max_size: usize) -> i64;
    fn netbridge_iodevice_write(device: *mut RawIoDevice, data: ByteView) -> i64;
    fn netbridge_iodevice_error_string(device: *const RawIoDevice, out: *mut ByteArray);

    fn netbridge_buffer_data(device: *const RawIoDevice, out: *mut ByteArray);
    fn netbridge_buffer_set_data(device: *mut RawIoDevice, bytes: ByteView) -> bool;

    fn netbridge_file_file_name(device: *const RawIoDevice, out: *mut ByteArray);
    fn netbridge_file_exists(device: *const RawIoDevice) -> bool;
    fn netbridge_file_exists_path(path: ByteView) -> bool;
    fn netbridge_file_remove(device: *mut RawIoDevice) -> bool;
    fn netbridge_file_flush(device: *mut RawIoDevice) -> bool;

    fn netbridge_temporaryfile_new(template: ByteView) -> *mut RawIoDevice;
    fn netbridge_temporaryfile_open(device: *mut RawIoDevice) -> bool;
    fn netbridge_temporaryfile_auto_remove(device: *mut RawIoDevice) -> bool;
    fn netbridge_temporaryfile_set_auto_remove(device: *mut RawIoDevice, enable: bool);
    fn netbridge_temporaryfile_file_template(device: *mut RawIoDevice, out: *mut ByteArray);
    fn netbridge_temporaryfile_set_file_template(device: *mut RawIoDevice, template: ByteView);
    fn netbridge_temporaryfile_rename(device: *mut RawIoDevice, new_name: ByteView) -> bool;
}

fn path_view(path: &Path) -> ByteView {
    ByteView::from_slice(path.as_os_str().as_encoded_bytes())
}

impl IoDevice {
    fn adopt(raw: *mut RawIoDevice) -> Self {
        Self::from_raw(raw).unwrap_or_else(|| std::process::abort())
    }

    /// `APPEND` and `TRUNCATE` imply write access.
    pub fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        if unsafe { netbridge_iodevice_open(self.as_mut_ptr(), mode) } {
            return Ok(());
        }
        Err(self.last_error())
    }

    pub fn close(&mut self) {
        unsafe { netbridge_iodevice_close(self.as_mut_ptr()) }
    }

    pub fn is_open(&self) -> bool {
        unsafe { netbridge_iodevice_is_open(self.as_ptr()) }
    }

    pub fn open_mode(&self) -> OpenMode {
        unsafe { netbridge_iodevice_open_mode(self.as_ptr()) }
    }

    pub fn size(&self) -> u64 {
        unsafe { netbridge_iodevice_size(self.as_ptr()) as u64 }
    }

    pub fn pos(&self) -> u64 {
        unsafe { netbridge_iodevice_pos(self.as_ptr()) as u64 }
    }

    /// True when closed or positioned at or past the end.
    pub fn at_end(&self) -> bool {
        unsafe { netbridge_iodevice_at_end(self.as_ptr()) }
    }

    pub fn error_string(&self) -> String {
        unsafe { string_from(|out| netbridge_iodevice_error_string(self.as_ptr(), out)) }
    }

    fn last_error(&self) -> io::Error {
        io::Error::other(self.error_string())
    }
}

impl Read for IoDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = unsafe { netbridge_iodevice_read(self.as_mut_ptr(), buf.as_mut_ptr(), buf.len()) };
        usize::try_from(count).map_err(|_| self.last_error())
    }
}

impl Write for IoDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = unsafe { netbridge_iodevice_write(self.as_mut_ptr(), ByteView::from_slice(buf)) };
        usize::try_from(count).map_err(|_| self.last_error())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for IoDevice {
    /// A writable buffer may seek past its end; the next write zero-fills the gap.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::Current(delta) => (self.pos() as i64).saturating_add(delta),
            SeekFrom::End(delta) => (self.size() as i64).saturating_add(delta),
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "Invalid pos"));
        }
        if unsafe { netbridge_iodevice_seek(self.as_mut_ptr(), target) } {
            return Ok(target as u64);
        }
        Err(self.last_error())
    }
}

/// In-memory device over a [`ByteArray`].
pub struct Buffer {
    device: IoDevice,
}

impl Buffer {
    pub fn new() -> Self {
        Self {
            device: IoDevice::adopt(unsafe { netbridge_buffer_new() }),
        }
    }

    pub fn with_data(bytes: &[u8]) -> Self {
        let mut buffer = Self::new();
        // A closed buffer always accepts new data.
        let _ = buffer.set_data(bytes);
        buffer
    }

    /// Shares the current contents.
    pub fn data(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_buffer_data(self.device.as_ptr(), out)) }
    }

    /// Refused while the buffer is open.
    pub fn set_data(&mut self, bytes: &[u8]) -> io::Result<()> {
        if unsafe { netbridge_buffer_set_data(self.device.as_mut_ptr(), ByteView::from_slice(bytes)) } {
            return Ok(());
        }
        Err(self.device.last_error())
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Buffer {
    type Target = IoDevice;

    fn deref(&self) -> &IoDevice {
        &self.device
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut IoDevice {
        &mut self.device
    }
}

/// Device over a file on disk.
pub struct File {
    device: IoDevice,
}

impl File {
    /// The file is not touched until [`open`](IoDevice::open).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            device: IoDevice::adopt(unsafe { netbridge_file_new(path_view(path.as_ref())) }),
        }
    }

    pub fn exists_path(path: impl AsRef<Path>) -> bool {
        unsafe { netbridge_file_exists_path(path_view(path.as_ref())) }
    }

    pub fn file_name(&self) -> String {
        unsafe { string_from(|out| netbridge_file_file_name(self.device.as_ptr(), out)) }
    }

    pub fn exists(&self) -> bool {
        unsafe { netbridge_file_exists(self.device.as_ptr()) }
    }

    /// Closes the file first.
    pub fn remove(&mut self) -> io::Result<()> {
        debug!(file = %self.file_name(), "Removing file");
        if unsafe { netbridge_file_remove(self.device.as_mut_ptr()) } {
            return Ok(());
        }
        Err(self.device.last_error())
    }
}

impl Deref for File {
    type Target = IoDevice;

    fn deref(&self) -> &IoDevice {
        &self.device
    }
}

impl DerefMut for File {
    fn deref_mut(&mut self) -> &mut IoDevice {
        &mut self.device
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.device.read(buf)
    }
}

impl Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.device.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if unsafe { netbridge_file_flush(self.device.as_mut_ptr()) } {
            return Ok(());
        }
        Err(self.device.last_error())
    }
}

impl Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.device.seek(pos)
    }
}

/// A uniquely named file that is removed when dropped.
///
/// The file is created by the first [`open`](TemporaryFile::open); until then
/// [`file_name`](File::file_name) is empty. The last `XXXXXX` in the template
/// becomes the unique part of the name.
pub struct TemporaryFile {
    file: File,
}

impl TemporaryFile {
    /// `netbridge.XXXXXX` in the system temp directory.
    pub fn new() -> Self {
        Self::with_template("")
    }

    /// A relative template resolves against the working directory.
    pub fn with_template(template: impl AsRef<Path>) -> Self {
        let device = IoDevice::adopt(unsafe { netbridge_temporaryfile_new(path_view(template.as_ref())) });
        Self {
            file: File { device },
        }
    }

    /// Opens read-write, creating the file the first time. Later opens
    /// reuse the same file.
    pub fn open(&mut self) -> io::Result<()> {
        if unsafe { netbridge_temporaryfile_open(self.file.device.as_mut_ptr()) } {
            return Ok(());
        }
        Err(self.file.device.last_error())
    }

    pub fn auto_remove(&mut self) -> bool {
        unsafe { netbridge_temporaryfile_auto_remove(self.file.device.as_mut_ptr()) }
    }

    pub fn set_auto_remove(&mut self, enable: bool) {
        unsafe { netbridge_temporaryfile_set_auto_remove(self.file.device.as_mut_ptr(), enable) }
    }

    pub fn file_template(&mut self) -> String {
        unsafe { string_from(|out| netbridge_temporaryfile_file_template(self.file.device.as_mut_ptr(), out)) }
    }

    /// Takes effect only if the file has not been created yet.
    pub fn set_file_template(&mut self, template: impl AsRef<Path>) {
        unsafe {
            netbridge_temporaryfile_set_file_template(self.file.device.as_mut_ptr(), path_view(template.as_ref()))
        }
    }

    /// Moves the file to `new_name` atomically; it then outlives this
    /// object. Fails rather than copying across filesystems.
    pub fn rename(&mut self, new_name: impl AsRef<Path>) -> io::Result<()> {
        debug!(from = %self.file_name(), to = %new_name.as_ref().display(), "Renaming temporary file");
        if unsafe { netbridge_temporaryfile_rename(self.file.device.as_mut_ptr(), path_view(new_name.as_ref())) } {
            return Ok(());
        }
        Err(self.file.device.last_error())
    }
}

impl Default for TemporaryFile {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TemporaryFile {
    type Target = File;

    fn deref(&self) -> &File {
        &self.file
    }
}

impl DerefMut for TemporaryFile {
    fn deref_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Read for TemporaryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for TemporaryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for TemporaryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.device.read(buf)
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.device.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Buffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.device.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_read_write_seek() {
        let mut buffer = Buffer::new();
        buffer.open(OpenMode::READ_WRITE).unwrap();
        buffer.write_all(b"hello world").unwrap();
        assert!(buffer.at_end());

        buffer.seek(SeekFrom::Start(6)).unwrap();
        let mut rest = String::new();
        buffer.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "world");

        assert_eq!(buffer.seek(SeekFrom::End(-5)).unwrap(), 6);
        assert_eq!(buffer.data().as_slice(), b"hello world");
    }

    #[test]
    fn test_closed_device_errors() {
        let mut buffer = Buffer::with_data(b"abc");
        let mut buf = [0u8; 3];
        let err = buffer.read(&mut buf).unwrap_err();
        assert_eq!(err.to_string(), "Device not open");
        assert!(buffer.open(OpenMode::NOT_OPEN).is_err());
        assert_eq!(buffer.error_string(), "Device access not specified");
    }

    #[test]
    fn test_set_data_refused_while_open() {
        let mut buffer = Buffer::with_data(b"abc");
        buffer.open(OpenMode::READ_ONLY).unwrap();
        assert!(buffer.set_data(b"xyz").is_err());
        assert!(buffer.write(b"x").is_err());
        buffer.close();
        buffer.set_data(b"xyz").unwrap();
        assert_eq!(buffer.size(), 3);
    }
}
