use std::ffi::CString;
use std::mem::MaybeUninit;
use std::path::PathBuf;
use std::str::FromStr;
use std::{fmt, io, ops};

use crate::cutils::{cerr, string_from_ptr, sysconf};

pub mod file;

/// The hostname of the machine we are running on, as reported by the kernel.
/// This may be a short name or a fully qualified one depending on how the
/// machine is configured; callers that care about the distinction should use
/// both forms via [`Hostname::short`].
#[derive(Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Hostname {
    inner: String,
}

impl fmt::Debug for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hostname").field(&self.inner).finish()
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl ops::Deref for Hostname {
    type Target = str;

    fn deref(&self) -> &str {
        &self.inner
    }
}

impl Hostname {
    #[cfg(test)]
    pub fn fake(hostname: &str) -> Self {
        Self {
            inner: hostname.to_string(),
        }
    }

    /// The part of the hostname before the first dot.
    pub fn short(&self) -> &str {
        self.inner.split('.').next().unwrap_or(&self.inner)
    }

    pub fn resolve() -> Self {
        // see `man 2 gethostname`
        const MAX_HOST_NAME_SIZE_ACCORDING_TO_SUSV2: libc::c_long = 255;

        // POSIX.1 systems limit hostnames to `HOST_NAME_MAX` bytes
        // not including null-byte in the count
        let max_hostname_size = sysconf(libc::_SC_HOST_NAME_MAX)
            .unwrap_or(MAX_HOST_NAME_SIZE_ACCORDING_TO_SUSV2)
            as usize;

        let buffer_size = max_hostname_size + 1 /* null byte delimiter */ ;
        let mut buf = vec![0; buffer_size];

        // SAFETY: we pass a valid buffer of `buffer_size` bytes; gethostname
        // never writes more than that and NUL-terminates on success
        match cerr(unsafe { libc::gethostname(buf.as_mut_ptr(), buffer_size) }) {
            Ok(_) => Self {
                // SAFETY: gethostname succeeded, so buf holds a NUL-terminated C string
                inner: unsafe { string_from_ptr(buf.as_ptr()) },
            },

            // ENAMETOOLONG cannot happen: buffer_size exceeds the maximum the
            // kernel will report
            Err(_) => {
                panic!("Unexpected error while retrieving hostname, this should not happen");
            }
        }
    }
}

pub fn syslog(priority: libc::c_int, facility: libc::c_int, message: &str) {
    let Ok(message) = CString::new(message) else {
        return;
    };

    // SAFETY: both pointers point to valid NUL-terminated strings; the "%s"
    // format consumes exactly one string argument
    unsafe {
        libc::syslog(
            priority | facility,
            b"%s\0".as_ptr().cast::<libc::c_char>(),
            message.as_ptr(),
        );
    }
}

pub type ProcessId = libc::pid_t;
pub type UserId = libc::uid_t;
pub type GroupId = libc::gid_t;

pub fn effective_uid() -> UserId {
    // SAFETY: geteuid cannot fail
    unsafe { libc::geteuid() }
}

pub fn real_uid() -> UserId {
    // SAFETY: getuid cannot fail
    unsafe { libc::getuid() }
}

pub fn real_gid() -> GroupId {
    // SAFETY: getgid cannot fail
    unsafe { libc::getgid() }
}

/// The name of the terminal connected to standard input, if any.
pub fn current_tty_name() -> Option<String> {
    let mut buf = vec![0 as libc::c_char; 256];
    // SAFETY: we pass a valid buffer and its length; ttyname_r NUL-terminates
    // on success and reports an error otherwise
    let res = unsafe { libc::ttyname_r(libc::STDIN_FILENO, buf.as_mut_ptr(), buf.len()) };
    if res == 0 {
        // SAFETY: ttyname_r succeeded, so buf holds a NUL-terminated C string
        Some(unsafe { string_from_ptr(buf.as_ptr()) })
    } else {
        None
    }
}

/// Resolve a user id to a username through the password database.
pub fn username_for_uid(uid: UserId) -> Option<String> {
    let buf_size = sysconf(libc::_SC_GETPW_R_SIZE_MAX).unwrap_or(1024) as usize;
    let mut buf = vec![0u8; buf_size];
    let mut pwd = MaybeUninit::<libc::passwd>::uninit();
    let mut result = std::ptr::null_mut::<libc::passwd>();

    // SAFETY: all out-pointers refer to live stack/heap memory of the stated
    // sizes; getpwuid_r initializes `pwd` and `result` on success
    let status = unsafe {
        libc::getpwuid_r(
            uid,
            pwd.as_mut_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
            &mut result,
        )
    };

    if status == 0 && !result.is_null() {
        // SAFETY: getpwuid_r reported success, so pwd is initialized and its
        // pw_name field points at a NUL-terminated string inside buf
        let pwd = unsafe { pwd.assume_init() };
        Some(unsafe { string_from_ptr(pwd.pw_name) })
    } else {
        None
    }
}

fn primary_gid_of(username: &CString) -> Option<GroupId> {
    let buf_size = sysconf(libc::_SC_GETPW_R_SIZE_MAX).unwrap_or(1024) as usize;
    let mut buf = vec![0u8; buf_size];
    let mut pwd = MaybeUninit::<libc::passwd>::uninit();
    let mut result = std::ptr::null_mut::<libc::passwd>();

    // SAFETY: see `username_for_uid`
    let status = unsafe {
        libc::getpwnam_r(
            username.as_ptr(),
            pwd.as_mut_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
            &mut result,
        )
    };

    if status == 0 && !result.is_null() {
        // SAFETY: getpwnam_r reported success
        Some(unsafe { pwd.assume_init() }.pw_gid)
    } else {
        None
    }
}

/// Membership check against the group database: either the user is listed as
/// a supplementary member of the group, or the group is their primary group.
pub fn user_in_group(username: &str, group: &str) -> bool {
    let (Ok(c_user), Ok(c_group)) = (CString::new(username), CString::new(group)) else {
        return false;
    };

    let buf_size = sysconf(libc::_SC_GETGR_R_SIZE_MAX).unwrap_or(1024) as usize;
    let mut buf = vec![0u8; buf_size];
    let mut grp = MaybeUninit::<libc::group>::uninit();
    let mut result = std::ptr::null_mut::<libc::group>();

    // SAFETY: all out-pointers refer to live memory of the stated sizes;
    // getgrnam_r initializes `grp` and `result` on success
    let status = unsafe {
        libc::getgrnam_r(
            c_group.as_ptr(),
            grp.as_mut_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
            &mut result,
        )
    };

    if status != 0 || result.is_null() {
        return false;
    }

    // SAFETY: getgrnam_r reported success, so grp is initialized and gr_mem
    // is a NULL-terminated array of pointers to NUL-terminated strings
    let grp = unsafe { grp.assume_init() };
    let mut members = grp.gr_mem;
    // SAFETY: we stop walking the array at the NULL sentinel
    while let Some(member) = unsafe { members.as_ref() } {
        if member.is_null() {
            break;
        }
        // SAFETY: non-NULL entries in gr_mem point to valid C strings
        if unsafe { string_from_ptr(*member) } == username {
            return true;
        }
        // SAFETY: gr_mem entries are contiguous up to the NULL sentinel
        members = unsafe { members.add(1) };
    }

    primary_gid_of(&c_user) == Some(grp.gr_gid)
}

/// Seconds since the Unix epoch, as used by rule time windows and the
/// authentication cache.
pub fn unix_now() -> i64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0,
    }
}

#[derive(Debug, Clone)]
pub struct Process {
    pub pid: ProcessId,
    pub parent_pid: Option<ProcessId>,
    pub session_id: ProcessId,
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}

impl Process {
    pub fn new() -> Process {
        Process {
            pid: Self::process_id(),
            parent_pid: Self::parent_id(),
            session_id: Self::session_id(),
        }
    }

    pub fn process_id() -> ProcessId {
        // NOTE libstd casts the `i32` that `libc::getpid` returns into `u32`
        // here we cast it back into `i32` (`ProcessId`)
        std::process::id() as ProcessId
    }

    pub fn parent_id() -> Option<ProcessId> {
        let pid = std::os::unix::process::parent_id() as ProcessId;
        if pid == 0 {
            None
        } else {
            Some(pid)
        }
    }

    pub fn session_id() -> ProcessId {
        // SAFETY: getsid(0) on the current process cannot fail
        unsafe { libc::getsid(0) }
    }
}

/// The name of the given process as recorded by the kernel, without arguments.
pub fn process_name(pid: ProcessId) -> Option<String> {
    let path = PathBuf::from_iter(["/proc", &pid.to_string(), "comm"]);
    let name = std::fs::read_to_string(path).ok()?;
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// The parent process id of the given process, read from its stat file.
pub fn parent_of(pid: ProcessId) -> Option<ProcessId> {
    let ppid: ProcessId = read_proc_stat(pid, 3).ok()?;
    if ppid <= 0 {
        None
    } else {
        Some(ppid)
    }
}

fn read_proc_stat<T: FromStr>(pid: ProcessId, field_idx: isize) -> io::Result<T> {
    let path = PathBuf::from_iter(["/proc", &pid.to_string(), "stat"]);
    let proc_stat = std::fs::read(path)?;

    // the process name (second field) may contain spaces and parentheses, so
    // field counting starts after the last ')' in the file
    let skip_past_second_arg = proc_stat.iter().rposition(|b| *b == b')').ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not find the process name field in the process stat file",
        )
    })?;
    let mut stat = &proc_stat[skip_past_second_arg..];

    let mut curr_field = 1;
    while curr_field < field_idx && !stat.is_empty() {
        if stat[0] == b' ' {
            curr_field += 1;
        }
        stat = &stat[1..];
    }

    if stat.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "process stat file was not of the expected format",
        ));
    }

    let field_end = stat
        .iter()
        .position(|b| *b == b' ')
        .unwrap_or(stat.len());
    let field = std::str::from_utf8(&stat[..field_end])
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid stat field encoding"))?;

    field.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            "could not parse process stat field",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hostname_short_form() {
        let host = Hostname::fake("db1.infra.example.com");
        assert_eq!(host.short(), "db1");

        let host = Hostname::fake("standalone");
        assert_eq!(host.short(), "standalone");
    }

    #[test]
    fn current_process_has_a_name() {
        let me = Process::new();
        assert!(process_name(me.pid).is_some());
    }

    #[test]
    fn parent_chain_terminates() {
        let mut pid = Process::process_id();
        let mut depth = 0;
        while let Some(parent) = parent_of(pid) {
            assert_ne!(parent, pid);
            pid = parent;
            depth += 1;
            assert!(depth < 128);
        }
    }

    #[test]
    fn can_resolve_own_username() {
        assert!(username_for_uid(real_uid()).is_some());
    }

    #[test]
    fn unknown_group_is_not_a_membership() {
        assert!(!user_in_group("root", "no-such-group-sudosh-test"));
    }
}
