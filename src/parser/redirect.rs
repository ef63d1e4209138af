//! Path safety rules for redirection targets.
//!
//! Classification is purely textual: the target string is checked against a
//! directory allowlist and denylist without touching the filesystem. In
//! particular symlinks are not resolved, so a symlink inside an allowed
//! directory that points at a denied target is accepted by these rules. That
//! is a documented limitation carried over from the original design; changing
//! it means changing observable behavior, not fixing a bug.

/// Absolute prefixes writes are allowed into.
const ALLOWED_PREFIXES: &[&str] = &["/tmp/", "/var/tmp/"];

/// Absolute prefixes writes are never allowed into. The denylist wins over
/// any overlapping allowlist entry.
const DENIED_PREFIXES: &[&str] = &[
    "/etc/", "/var/log/", "/var/run/", "/usr/", "/bin/", "/sbin/", "/boot/", "/root/", "/sys/",
    "/proc/", "/dev/",
];

/// Decide whether a redirection target is acceptable. Safe targets are files
/// under `/tmp/` or `/var/tmp/`, below the home directory (`~/...`), or
/// relative paths; anything under a denied system prefix, containing a `..`
/// traversal segment, or empty is rejected.
pub fn is_safe_target(path: &str) -> bool {
    let path = path.trim();
    if path.is_empty() || path.contains('\0') {
        return false;
    }

    if has_traversal(path) {
        return false;
    }

    // denylist takes precedence over everything else
    if DENIED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix) || path == &prefix[..prefix.len() - 1])
    {
        return false;
    }

    if ALLOWED_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return true;
    }

    if path.starts_with("~/") {
        return true;
    }

    // a remaining absolute path points somewhere we have no rule for
    if path.starts_with('/') {
        return false;
    }

    // relative paths resolve against the working directory
    true
}

fn has_traversal(path: &str) -> bool {
    // cover both separator conventions
    for sep in ['/', '\\'] {
        if path
            .split(sep)
            .any(|segment| segment == "..")
        {
            return true;
        }
    }
    false
}

/// Scan a raw command line for redirection operators and vet each target.
/// Lines without redirection are trivially fine.
pub fn validate_redirection_in(command_line: &str) -> bool {
    let mut chars = command_line.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '>' | '<' if !in_single && !in_double => {
                if c == '>' && chars.peek() == Some(&'>') {
                    chars.next();
                }
                // the target runs to the next unquoted operator or pipe
                let mut target = String::new();
                let mut t_single = false;
                let mut t_double = false;
                while let Some(&next) = chars.peek() {
                    match next {
                        '\'' if !t_double => t_single = !t_single,
                        '"' if !t_single => t_double = !t_double,
                        '>' | '<' | '|' if !t_single && !t_double => break,
                        _ => target.push(next),
                    }
                    chars.next();
                }
                if !is_safe_target(&target) {
                    return false;
                }
            }
            _ => {}
        }
    }

    true
}
