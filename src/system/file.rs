use std::fs::{File, OpenOptions};
use std::io::{self, Error, ErrorKind};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use crate::cutils::cerr;

/// An advisory lock held on an open file. The lock is released on drop, but
/// callers that care about errors should call [`FileLock::unlock`].
pub(crate) struct FileLock {
    fd: RawFd,
}

impl FileLock {
    /// Take an exclusive lock on the file. With `nonblocking` set, contention
    /// is reported as an error instead of waiting.
    pub(crate) fn exclusive(file: &File, nonblocking: bool) -> io::Result<Self> {
        let fd = file.as_raw_fd();
        flock(fd, libc::LOCK_EX, nonblocking)?;
        Ok(Self { fd })
    }

    pub(crate) fn unlock(self) -> io::Result<()> {
        let fd = self.fd;
        std::mem::forget(self);
        flock(fd, libc::LOCK_UN, false)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        flock(self.fd, libc::LOCK_UN, false).ok();
    }
}

fn flock(fd: RawFd, mut operation: libc::c_int, nonblocking: bool) -> io::Result<()> {
    if nonblocking {
        operation |= libc::LOCK_NB;
    }

    // SAFETY: flock on an arbitrary fd cannot cause memory unsafety
    cerr(unsafe { libc::flock(fd, operation) })?;
    Ok(())
}

/// Open a policy file for reading, provided it cannot have been tampered with
/// by an unprivileged user: it must be owned by root and must not be group- or
/// world-writable.
pub fn secure_open(path: impl AsRef<Path>) -> io::Result<File> {
    let path = path.as_ref();
    let file = OpenOptions::new().read(true).open(path)?;
    let meta = file.metadata()?;
    let error = |msg| Error::new(ErrorKind::PermissionDenied, msg);

    let file_mode = meta.permissions().mode();
    if meta.uid() != 0 {
        Err(error(format!("{} must be owned by root", path.display())))
    } else if meta.gid() != 0 && (file_mode & 0o020 != 0) {
        Err(error(format!(
            "{} cannot be group-writable",
            path.display()
        )))
    } else if file_mode & 0o002 != 0 {
        Err(error(format!(
            "{} cannot be world-writable",
            path.display()
        )))
    } else {
        Ok(file)
    }
}

#[cfg(test)]
pub(crate) fn tempdir() -> std::path::PathBuf {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("Failed to get system time")
        .as_nanos();
    let pid = std::process::id();

    let dir = std::path::PathBuf::from("/tmp").join(format!("sudosh_test_{pid}_{timestamp}"));
    std::fs::create_dir_all(&dir).expect("Failed to create test directory");
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempfile() -> io::Result<File> {
        let path = tempdir().join("lockfile");
        File::create(path)
    }

    #[test]
    fn can_lock_and_unlock_a_tmp_file() {
        let f = tempfile().unwrap();
        let lock = FileLock::exclusive(&f, true).unwrap();
        assert!(lock.unlock().is_ok());
        // can relock after an unlock
        let lock = FileLock::exclusive(&f, true).unwrap();
        drop(lock);
    }

    #[test]
    fn secure_open_rejects_world_writable() {
        // /etc/hosts should be readable and "secure"
        if std::fs::File::open("/etc/hosts").is_ok() {
            assert!(secure_open("/etc/hosts").is_ok());
        }

        let path = tempdir().join("sloppy");
        std::fs::write(&path, b"x").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o666);
        std::fs::set_permissions(&path, perms).unwrap();
        assert!(secure_open(&path).is_err());
    }
}
