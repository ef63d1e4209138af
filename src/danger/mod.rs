#![forbid(unsafe_code)]
//! Static risk classification of commands, independent of policy.
//!
//! The classifier is pure and table-driven: a command line maps to a
//! [`DangerTier`] from its basename, the paths it mentions, and a set of
//! dangerous flag patterns. It consults neither rules nor the environment.

use crate::parser::strip_path;

/// Risk tiers in ascending severity; `Critical` compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DangerTier {
    Safe,
    PatternMatch,
    SensitivePath,
    Moderate,
    Critical,
}

/// Commands that can cause significant, often irreversible damage.
const CRITICAL_COMMANDS: &[&str] = &[
    // file destruction
    "rm", "rmdir", "unlink", "shred", "mv", "cp", "dd", "truncate",
    // permission and attribute changes
    "chmod", "chown", "chgrp", "chattr", "setfacl", "setcap",
    // service and system control
    "systemctl", "service", "init", "shutdown", "reboot", "halt", "poweroff",
    // package management
    "apt", "apt-get", "yum", "dnf", "rpm", "dpkg", "snap", "flatpak", "brew", "pip", "npm",
    // network configuration
    "iptables", "ip6tables", "ufw", "firewall-cmd", "ifconfig", "ip", "route", "netstat",
    // user management and privilege tools
    "useradd", "userdel", "usermod", "passwd", "groupadd", "groupdel", "groupmod", "su", "sudo",
    "sudoedit",
    // storage
    "mount", "umount", "fsck", "mkfs", "fdisk", "parted", "lvm", "mdadm",
    // process control
    "kill", "killall", "pkill", "killproc",
    // archive tools can clobber arbitrary paths
    "tar", "gzip", "gunzip", "zip", "unzip",
];

/// Commands that can modify system files or expose sensitive information.
const MODERATE_COMMANDS: &[&str] = &[
    // editors
    "vi", "vim", "nano", "emacs", "gedit", "kate", "code", "atom", "sublime",
    // filesystem manipulation
    "touch", "mkdir", "ln", "find", "rsync", "scp", "sftp",
    // process and session inspection
    "ps", "top", "htop", "lsof", "ss", "who", "w", "last", "lastlog",
    // file viewers
    "tail", "head", "less", "more", "cat", "grep", "awk", "sed",
    // development tools
    "make", "gcc", "g++", "python", "perl", "ruby", "node", "java", "javac",
    // database clients
    "mysql", "psql", "sqlite3", "mongo",
];

/// Directory prefixes whose mention anywhere in a command line raises the
/// tier to at least `SensitivePath`.
const SENSITIVE_PATHS: &[&str] = &[
    "/etc/", "/var/log/", "/var/run/", "/var/lib/", "/usr/bin/", "/usr/sbin/", "/bin/", "/sbin/",
    "/boot/", "/root/", "/home/", "/opt/", "/sys/", "/proc/", "/dev/",
];

/// Flag and keyword substrings that mark otherwise unclassified commands.
const DANGEROUS_PATTERNS: &[&str] = &[
    // recursive and force flags
    " -R", " --recursive", " -rf", " -Rf", " -fr", " -fR", " -f", " --force", " -y", " --yes",
    // wide-scope flags
    " --system", " --global", " --all",
    // privilege escalation embedded mid-line
    "sudo ", "su ", "runuser ",
    // redirection into system directories
    "> /etc/", ">> /etc/", "> /var/", ">> /var/", "> /usr/", ">> /usr/", "> /boot/", ">> /boot/",
];

/// Classify a command line. Evaluation order is fixed: critical table,
/// moderate table, sensitive path substring, dangerous pattern substring,
/// otherwise safe.
pub fn classify(command_line: &str) -> DangerTier {
    let command_line = command_line.trim();
    if command_line.is_empty() {
        return DangerTier::Safe;
    }

    let basename = command_line
        .split_whitespace()
        .next()
        .map(strip_path)
        .unwrap_or("");

    if CRITICAL_COMMANDS.contains(&basename) {
        return DangerTier::Critical;
    }

    if MODERATE_COMMANDS.contains(&basename) {
        return DangerTier::Moderate;
    }

    if SENSITIVE_PATHS
        .iter()
        .any(|path| command_line.contains(path))
    {
        return DangerTier::SensitivePath;
    }

    if DANGEROUS_PATTERNS
        .iter()
        .any(|pattern| command_line.contains(pattern))
    {
        return DangerTier::PatternMatch;
    }

    DangerTier::Safe
}

/// A user-facing explanation for a tier, for denial and re-auth messages.
pub fn explain(tier: DangerTier) -> &'static str {
    match tier {
        DangerTier::Critical => "Critical system command that can cause significant damage",
        DangerTier::Moderate => {
            "Command that can modify system files or access sensitive information"
        }
        DangerTier::SensitivePath => "Command involves access to sensitive system directories",
        DangerTier::PatternMatch => "Command contains potentially dangerous flags or patterns",
        DangerTier::Safe => "Command is considered safe",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn critical_commands_are_critical() {
        assert_eq!(classify("rm -rf /tmp/x"), DangerTier::Critical);
        assert_eq!(classify("/usr/bin/systemctl stop nginx"), DangerTier::Critical);
        assert_eq!(classify("dd if=/dev/zero of=/dev/sda"), DangerTier::Critical);
        assert_eq!(classify("sudo id"), DangerTier::Critical);
    }

    #[test]
    fn moderate_commands_are_moderate() {
        assert_eq!(classify("vim config.yaml"), DangerTier::Moderate);
        assert_eq!(classify("cat notes.txt"), DangerTier::Moderate);
        assert_eq!(classify("find . -name foo"), DangerTier::Moderate);
    }

    #[test]
    fn basename_wins_over_paths_in_arguments() {
        // the critical table is consulted before path scanning
        assert_eq!(classify("rm /home/alice/file"), DangerTier::Critical);
        assert_eq!(classify("cat /etc/hosts"), DangerTier::Moderate);
    }

    #[test]
    fn sensitive_paths_escalate_unknown_commands() {
        assert_eq!(classify("mycmd /etc/shadow"), DangerTier::SensitivePath);
        assert_eq!(classify("backup-tool /var/log/"), DangerTier::SensitivePath);
    }

    #[test]
    fn dangerous_flags_are_flagged() {
        assert_eq!(classify("cleanup -rf"), DangerTier::PatternMatch);
        assert_eq!(classify("installer --force"), DangerTier::PatternMatch);
        assert_eq!(classify("wrapper sudo id"), DangerTier::PatternMatch);
    }

    #[test]
    fn plain_commands_are_safe() {
        assert_eq!(classify("ls"), DangerTier::Safe);
        assert_eq!(classify("echo hello"), DangerTier::Safe);
        assert_eq!(classify(""), DangerTier::Safe);
        assert_eq!(classify("   "), DangerTier::Safe);
    }

    #[test]
    fn tier_ordering_matches_severity() {
        assert!(DangerTier::Critical > DangerTier::Moderate);
        assert!(DangerTier::Moderate > DangerTier::SensitivePath);
        assert!(DangerTier::SensitivePath > DangerTier::PatternMatch);
        assert!(DangerTier::PatternMatch > DangerTier::Safe);
    }

    #[test]
    fn explanations_are_stable() {
        assert_eq!(
            explain(DangerTier::Critical),
            "Critical system command that can cause significant damage"
        );
        assert_eq!(explain(DangerTier::Safe), "Command is considered safe");
    }
}
