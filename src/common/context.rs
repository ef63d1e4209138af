use crate::cache::AuthCache;
use crate::common::Error;
use crate::system::{self, GroupId, Hostname, Process, UserId};

/// Everything about the invoking session that authorization decisions need:
/// who is asking, from which terminal, on which host, in which process.
#[derive(Debug, Clone)]
pub struct Context {
    pub username: String,
    pub uid: UserId,
    pub gid: GroupId,
    pub tty: Option<String>,
    pub hostname: Hostname,
    pub process: Process,
    pub cache_timeout: i64,
    /// Target identity for all commands in this session; `None` means the
    /// default target, root.
    pub runas_user: Option<String>,
    pub runas_group: Option<String>,
    pub verbose: bool,
}

impl Context {
    /// Capture the real invoking identity. The real uid is used, not the
    /// effective one, so a setuid install still attributes actions to the
    /// user who typed them.
    pub fn current() -> Result<Context, Error> {
        let uid = system::real_uid();
        let username = system::username_for_uid(uid)
            .ok_or_else(|| Error::UserNotFound(format!("uid {uid}")))?;

        Ok(Context {
            username,
            uid,
            gid: system::real_gid(),
            tty: system::current_tty_name(),
            hostname: Hostname::resolve(),
            process: Process::new(),
            cache_timeout: AuthCache::DEFAULT_TIMEOUT,
            runas_user: None,
            runas_group: None,
            verbose: false,
        })
    }

    pub fn short_host(&self) -> &str {
        self.hostname.short()
    }

    pub fn fqdn(&self) -> &str {
        &self.hostname
    }

    /// The terminal name used for cache entries; sessions without a terminal
    /// share the "notty" slot but never a cached authentication, since their
    /// session ids differ.
    pub fn tty_label(&self) -> &str {
        self.tty.as_deref().unwrap_or("notty")
    }
}
