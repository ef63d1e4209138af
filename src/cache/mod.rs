//! Authentication result caching.
//!
//! A successful authentication is recorded as a fixed-size record in a file
//! under [`AuthCache::DEFAULT_DIR`], one file per user and terminal. A later
//! session on the same terminal within the timeout window skips the password
//! prompt. Records never store credentials, only the fact and time of a
//! successful authentication.
//!
//! Every read validates the file before trusting it: wrong permissions or a
//! wrong owner invalidate the entry on the spot.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Error, ErrorKind, Read, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::log::auth_warn;
use crate::system::{self, file::FileLock, GroupId, UserId};

const NAME_LEN: usize = 64;
const TTY_LEN: usize = 64;
const HOST_LEN: usize = 128;

/// Three NUL-padded strings followed by uid, gid, session id and timestamp.
const RECORD_SIZE: usize = NAME_LEN + TTY_LEN + HOST_LEN + 4 + 4 + 4 + 8;

/// One cached authentication. The identity fields are compared on every
/// lookup; a record for another session never produces a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub username: String,
    pub tty: String,
    pub hostname: String,
    pub uid: UserId,
    pub gid: GroupId,
    pub session_id: i32,
    pub timestamp: i64,
}

impl CacheEntry {
    fn encode(&self) -> io::Result<[u8; RECORD_SIZE]> {
        let mut buf = [0u8; RECORD_SIZE];
        let mut at = 0;

        for (field, len) in [
            (&self.username, NAME_LEN),
            (&self.tty, TTY_LEN),
            (&self.hostname, HOST_LEN),
        ] {
            let bytes = field.as_bytes();
            // the padding NUL doubles as the terminator
            if bytes.len() >= len || bytes.contains(&0) {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "cache entry field too long",
                ));
            }
            buf[at..at + bytes.len()].copy_from_slice(bytes);
            at += len;
        }

        buf[at..at + 4].copy_from_slice(&self.uid.to_le_bytes());
        at += 4;
        buf[at..at + 4].copy_from_slice(&self.gid.to_le_bytes());
        at += 4;
        buf[at..at + 4].copy_from_slice(&self.session_id.to_le_bytes());
        at += 4;
        buf[at..at + 8].copy_from_slice(&self.timestamp.to_le_bytes());

        Ok(buf)
    }

    fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() != RECORD_SIZE {
            return Err(Error::new(ErrorKind::InvalidData, "cache record truncated"));
        }

        let string_at = |at: usize, len: usize| -> io::Result<String> {
            let field = &buf[at..at + len];
            let end = field.iter().position(|&b| b == 0).unwrap_or(len);
            String::from_utf8(field[..end].to_vec())
                .map_err(|_| Error::new(ErrorKind::InvalidData, "cache record not utf-8"))
        };

        let at = NAME_LEN + TTY_LEN + HOST_LEN;
        let int_at = |at: usize| -> [u8; 4] { buf[at..at + 4].try_into().unwrap() };

        Ok(CacheEntry {
            username: string_at(0, NAME_LEN)?,
            tty: string_at(NAME_LEN, TTY_LEN)?,
            hostname: string_at(NAME_LEN + TTY_LEN, HOST_LEN)?,
            uid: UserId::from_le_bytes(int_at(at)),
            gid: GroupId::from_le_bytes(int_at(at + 4)),
            session_id: i32::from_le_bytes(int_at(at + 8)),
            timestamp: i64::from_le_bytes(buf[at + 12..at + 20].try_into().unwrap()),
        })
    }
}

/// The on-disk cache of recent authentications.
pub struct AuthCache {
    dir: PathBuf,
    timeout: i64,
}

impl AuthCache {
    pub const DEFAULT_DIR: &'static str = "/var/run/sudosh";
    /// Seconds a cached authentication stays valid.
    pub const DEFAULT_TIMEOUT: i64 = 15 * 60;

    const FILE_PREFIX: &'static str = "auth_cache_";

    pub fn new() -> Self {
        Self::with_dir(Self::DEFAULT_DIR, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_dir(dir: impl Into<PathBuf>, timeout: i64) -> Self {
        Self {
            dir: dir.into(),
            timeout,
        }
    }

    /// A view of the same cache directory with a different validity window,
    /// for rules that set their own timestamp timeout.
    pub fn with_timeout(&self, timeout: i64) -> Self {
        Self {
            dir: self.dir.clone(),
            timeout,
        }
    }

    fn entry_path(&self, username: &str, tty: &str) -> PathBuf {
        // tty names like "pts/0" must not introduce path components
        let tty = tty.replace('/', "_");
        self.dir
            .join(format!("{}{}_{}", Self::FILE_PREFIX, username, tty))
    }

    /// Look up a valid cached authentication for this session. Any entry
    /// that fails validation is removed rather than retried.
    pub fn check(&self, current: &CacheEntry) -> bool {
        let path = self.entry_path(&current.username, &current.tty);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(_) => return false,
        };

        if !self.entry_is_trusted(&path, &file) {
            self.discard(&path);
            return false;
        }

        let lock = match FileLock::exclusive(&file, true) {
            Ok(lock) => lock,
            // another process holds the entry; treat as a miss
            Err(_) => return false,
        };
        let stored = self.read_entry(&file);
        lock.unlock().ok();

        let stored = match stored {
            Ok(stored) => stored,
            Err(err) => {
                auth_warn!("removing unreadable cache entry {}: {err}", path.display());
                self.discard(&path);
                return false;
            }
        };

        let same_session = stored.username == current.username
            && stored.tty == current.tty
            && stored.uid == current.uid
            && stored.session_id == current.session_id;
        if !same_session {
            self.discard(&path);
            return false;
        }

        let age = system::unix_now() - stored.timestamp;
        if age < 0 || age > self.timeout {
            self.discard(&path);
            return false;
        }

        true
    }

    /// Record a successful authentication. An entry already present at the
    /// target path makes the update fail rather than be overwritten; invalid
    /// entries are removed during lookup, so the slot is normally free by
    /// the time a fresh authentication needs it.
    pub fn update(&self, entry: &CacheEntry) -> io::Result<()> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&self.dir)?;

        let path = self.entry_path(&entry.username, &entry.tty);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;

        let lock = FileLock::exclusive(&file, true)?;
        let result = file
            .write_all(&entry.encode()?)
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_all());
        lock.unlock()?;
        result
    }

    /// Drop the cached authentication for one session, if any.
    pub fn clear(&self, username: &str, tty: &str) {
        self.discard(&self.entry_path(username, tty));
    }

    /// Remove every expired entry. A missing cache directory is not an
    /// error; there is simply nothing to sweep.
    pub fn sweep(&self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };

        let now = system::unix_now();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(Self::FILE_PREFIX) {
                continue;
            }

            let expired = match entry.metadata() {
                Ok(meta) => now - meta.mtime() > self.timeout,
                Err(_) => true,
            };
            if expired {
                self.discard(&entry.path());
            }
        }

        Ok(())
    }

    fn entry_is_trusted(&self, path: &Path, file: &File) -> bool {
        let meta = match file.metadata() {
            Ok(meta) => meta,
            Err(_) => return false,
        };

        if meta.permissions().mode() & 0o777 != 0o600 {
            auth_warn!(
                "cache entry {} has unsafe permissions, discarding",
                path.display()
            );
            return false;
        }
        if meta.uid() != system::effective_uid() {
            auth_warn!(
                "cache entry {} is not ours, discarding",
                path.display()
            );
            return false;
        }

        true
    }

    fn read_entry(&self, mut file: &File) -> io::Result<CacheEntry> {
        let mut buf = [0u8; RECORD_SIZE];
        file.read_exact(&mut buf)?;
        CacheEntry::decode(&buf)
    }

    fn discard(&self, path: &Path) {
        fs::remove_file(path).ok();
    }
}

impl Default for AuthCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::file::tempdir;
    use pretty_assertions::assert_eq;

    fn entry() -> CacheEntry {
        CacheEntry {
            username: "alice".to_string(),
            tty: "pts/3".to_string(),
            hostname: "web1".to_string(),
            uid: 1000,
            gid: 1000,
            session_id: 4321,
            timestamp: system::unix_now(),
        }
    }

    #[test]
    fn records_round_trip() {
        let original = entry();
        let encoded = original.encode().unwrap();
        assert_eq!(encoded.len(), RECORD_SIZE);
        assert_eq!(CacheEntry::decode(&encoded).unwrap(), original);
    }

    #[test]
    fn decode_rejects_wrong_sizes() {
        assert!(CacheEntry::decode(&[0u8; RECORD_SIZE - 1]).is_err());
        assert!(CacheEntry::decode(&[0u8; RECORD_SIZE + 1]).is_err());
    }

    #[test]
    fn encode_rejects_overlong_fields() {
        let mut e = entry();
        e.username = "x".repeat(NAME_LEN);
        assert!(e.encode().is_err());
    }

    #[test]
    fn update_then_check_hits() {
        let cache = AuthCache::with_dir(tempdir().join("cache"), 900);
        let mut e = entry();
        e.uid = system::effective_uid();
        cache.update(&e).unwrap();
        assert!(cache.check(&e));
    }

    #[test]
    fn update_never_overwrites_an_existing_entry() {
        let cache = AuthCache::with_dir(tempdir().join("cache"), 900);
        let mut e = entry();
        e.uid = system::effective_uid();

        // a file squatting on the entry path makes the update fail closed
        fs::create_dir_all(cache.entry_path(&e.username, &e.tty).parent().unwrap()).unwrap();
        fs::write(cache.entry_path(&e.username, &e.tty), b"squatter").unwrap();
        assert!(cache.update(&e).is_err());

        // the slot is free again once the invalid entry is discarded
        assert!(!cache.check(&e));
        cache.update(&e).unwrap();
        assert!(cache.check(&e));
    }

    #[test]
    fn rule_supplied_timeout_overrides_the_default_window() {
        let cache = AuthCache::with_dir(tempdir().join("cache"), 900);
        let mut e = entry();
        e.uid = system::effective_uid();
        e.timestamp = system::unix_now() - 10;
        cache.update(&e).unwrap();

        // within the default window, but outside a rule-tightened one
        assert!(cache.check(&e));
        assert!(!cache.with_timeout(5).check(&e));
    }

    #[test]
    fn a_different_session_never_hits() {
        let cache = AuthCache::with_dir(tempdir().join("cache"), 900);
        let mut e = entry();
        e.uid = system::effective_uid();
        cache.update(&e).unwrap();

        let mut other = e.clone();
        other.session_id += 1;
        assert!(!cache.check(&other));
        // the mismatched entry was discarded, so the original misses too
        assert!(!cache.check(&e));
    }

    #[test]
    fn stale_entries_are_discarded() {
        let cache = AuthCache::with_dir(tempdir().join("cache"), 0);
        let mut e = entry();
        e.uid = system::effective_uid();
        e.timestamp = system::unix_now() - 10;
        cache.update(&e).unwrap();

        assert!(!cache.check(&e));
        assert!(!cache.entry_path(&e.username, &e.tty).exists());
    }

    #[test]
    fn loose_permissions_invalidate_an_entry() {
        let cache = AuthCache::with_dir(tempdir().join("cache"), 900);
        let mut e = entry();
        e.uid = system::effective_uid();
        cache.update(&e).unwrap();

        let path = cache.entry_path(&e.username, &e.tty);
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&path, perms).unwrap();

        assert!(!cache.check(&e));
        assert!(!path.exists());
    }

    #[test]
    fn clear_removes_the_entry() {
        let cache = AuthCache::with_dir(tempdir().join("cache"), 900);
        let mut e = entry();
        e.uid = system::effective_uid();
        cache.update(&e).unwrap();

        cache.clear(&e.username, &e.tty);
        assert!(!cache.check(&e));
    }

    #[test]
    fn sweep_removes_only_expired_cache_files() {
        let dir = tempdir().join("cache");
        let cache = AuthCache::with_dir(&dir, 0);
        let mut e = entry();
        e.uid = system::effective_uid();
        cache.update(&e).unwrap();

        // an unrelated file in the directory is left alone
        let bystander = dir.join("unrelated");
        fs::write(&bystander, b"x").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1100));
        cache.sweep().unwrap();

        assert!(!cache.entry_path(&e.username, &e.tty).exists());
        assert!(bystander.exists());
    }

    #[test]
    fn sweeping_a_missing_directory_is_fine() {
        let cache = AuthCache::with_dir("/nonexistent/sudosh-cache", 900);
        assert!(cache.sweep().is_ok());
    }

    #[test]
    fn tty_names_cannot_escape_the_cache_directory() {
        let cache = AuthCache::with_dir("/var/run/sudosh", 900);
        let path = cache.entry_path("alice", "pts/0");
        assert_eq!(
            path,
            PathBuf::from("/var/run/sudosh/auth_cache_alice_pts_0")
        );
    }
}
