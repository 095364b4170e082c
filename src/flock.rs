use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on a database directory, taken on a small lock
/// file inside it. The [`crate::Database`] holds one for its lifetime so a
/// second process can never append to the same collection files. The lock
/// is tied to the open handle: it dies with the process, so a crash never
/// leaves the directory stuck.
#[derive(Debug)]
pub struct FileLock {
    _handle: File,
    path: PathBuf,
}

impl FileLock {
    /// Takes the lock, failing immediately if another process holds it
    /// rather than waiting. The owner's process id is written into the
    /// file so an operator can tell which process has the database.
    pub fn lock<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut handle = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        acquire(&handle)?;

        writeln!(handle, "{}", std::process::id())?;
        handle.flush()?;

        Ok(Self {
            _handle: handle,
            path,
        })
    }

    /// Releases the lock. Dropping the guard has the same effect. The lock
    /// file itself stays behind; removing it would race a concurrent open
    /// taking the lock on the same inode.
    pub fn unlock(self) -> io::Result<()> {
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn acquire(handle: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(handle.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(windows)]
fn acquire(handle: &File) -> io::Result<()> {
    use std::os::windows::io::AsRawHandle;
    use winapi::um::fileapi::LockFileEx;
    use winapi::um::minwinbase::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY};

    let ok = unsafe {
        LockFileEx(
            handle.as_raw_handle() as *mut _,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            !0,
            !0,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn acquire(_handle: &File) -> io::Result<()> {
    // No advisory locking on this platform; single-process use only.
    Ok(())
}
