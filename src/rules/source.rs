//! Rule sources: where [`SudoRule`] lists come from.
//!
//! A source that is simply absent or misconfigured yields an empty list, not
//! an error; policy then falls back to the administrative-group default.
//! Rules are re-read on every decision so an administrator edit takes effect
//! at the next prompt.

use std::io::Read;
use std::path::PathBuf;

use crate::log::auth_warn;
use crate::system;

use super::{Groups, RuleOptions, SudoRule};

pub trait RuleSource {
    fn load_rules(&self, username: &str) -> Vec<SudoRule>;
}

/// A fixed in-memory rule list, used by tests and embedders.
pub struct StaticRules(pub Vec<SudoRule>);

impl RuleSource for StaticRules {
    fn load_rules(&self, _username: &str) -> Vec<SudoRule> {
        self.0.clone()
    }
}

/// Group membership backed by the system group database.
pub struct NssGroups;

impl Groups for NssGroups {
    fn is_member(&self, user: &str, group: &str) -> bool {
        system::user_in_group(user, group)
    }
}

/// Administrative groups that grant a default catch-all rule when no
/// configured source produces any rules for the user.
const ADMIN_GROUPS: &[&str] = &["wheel", "sudo", "admin"];

/// The degraded mode of the directory collaborators: members of an
/// administrative group may run anything, with authentication.
pub fn admin_group_fallback(username: &str, groups: &dyn Groups) -> Vec<SudoRule> {
    for group in ADMIN_GROUPS {
        if groups.is_member(username, group) {
            return vec![SudoRule {
                user_pattern: format!("%{group}"),
                command_pattern: "ALL".to_string(),
                ..Default::default()
            }];
        }
    }
    Vec::new()
}

/// A sudoers-style policy file. The file must be root-owned and not writable
/// by group or world; a file failing that check is treated the same as a
/// missing one, after a warning.
pub struct FileRules {
    path: PathBuf,
}

impl FileRules {
    pub const DEFAULT_PATH: &'static str = "/etc/sudosh.rules";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RuleSource for FileRules {
    fn load_rules(&self, _username: &str) -> Vec<SudoRule> {
        let mut file = match system::file::secure_open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                auth_warn!("ignoring rule file {}: {err}", self.path.display());
                return Vec::new();
            }
        };

        let mut contents = String::new();
        if let Err(err) = file.read_to_string(&mut contents) {
            auth_warn!("could not read rule file {}: {err}", self.path.display());
            return Vec::new();
        }

        parse_rules(&contents)
    }
}

/// Parse a rule document. Each line reads
///
/// ```text
/// user host = (runas_user:runas_group) TAG: command, command, ...
/// ```
///
/// where the runas parenthetical and tags are optional and recognized tags
/// are `NOPASSWD:`, `PASSWD:`, `NOEXEC:` and `ENV_RESET:`. A leading `!`
/// negates an individual command pattern. Malformed lines are skipped with
/// a warning instead of poisoning the whole document.
pub fn parse_rules(contents: &str) -> Vec<SudoRule> {
    let mut rules = Vec::new();

    for (lineno, raw_line) in contents.lines().enumerate() {
        let line = match raw_line.split_once('#') {
            Some((before, _)) => before.trim(),
            None => raw_line.trim(),
        };
        if line.is_empty() || line.starts_with("Defaults") {
            continue;
        }

        match parse_line(line) {
            Some(mut line_rules) => rules.append(&mut line_rules),
            None => {
                auth_warn!("ignoring malformed rule on line {}", lineno + 1);
            }
        }
    }

    rules
}

fn parse_line(line: &str) -> Option<Vec<SudoRule>> {
    let (lhs, rhs) = line.split_once('=')?;

    let mut lhs_parts = lhs.split_whitespace();
    let user_pattern = lhs_parts.next()?.to_string();
    let host_pattern = lhs_parts.next().map(str::to_string);
    if lhs_parts.next().is_some() {
        return None;
    }

    let mut rest = rhs.trim();

    let mut runas_user = None;
    let mut runas_group = None;
    if let Some(after_open) = rest.strip_prefix('(') {
        let (spec, tail) = after_open.split_once(')')?;
        match spec.split_once(':') {
            Some((user, group)) => {
                runas_user = non_empty(user);
                runas_group = non_empty(group);
            }
            None => runas_user = non_empty(spec),
        }
        rest = tail.trim();
    }

    let mut options = RuleOptions::default();
    loop {
        if let Some(tail) = rest.strip_prefix("NOPASSWD:") {
            options.nopasswd = true;
            rest = tail.trim();
        } else if let Some(tail) = rest.strip_prefix("PASSWD:") {
            options.nopasswd = false;
            rest = tail.trim();
        } else if let Some(tail) = rest.strip_prefix("NOEXEC:") {
            options.noexec = true;
            rest = tail.trim();
        } else if let Some(tail) = rest.strip_prefix("ENV_RESET:") {
            options.env_reset = true;
            rest = tail.trim();
        } else {
            break;
        }
    }

    if rest.is_empty() {
        return None;
    }

    let rules = rest
        .split(',')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| SudoRule {
            user_pattern: user_pattern.clone(),
            host_pattern: host_pattern.clone(),
            runas_user: runas_user.clone(),
            runas_group: runas_group.clone(),
            command_pattern: pattern.to_string(),
            options: options.clone(),
            ..Default::default()
        })
        .collect::<Vec<_>>();

    if rules.is_empty() {
        None
    } else {
        Some(rules)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_full_line() {
        let rules = parse_rules("alice web* = (root:wheel) NOPASSWD: /usr/bin/systemctl, !/bin/sh");
        assert_eq!(rules.len(), 2);

        assert_eq!(rules[0].user_pattern, "alice");
        assert_eq!(rules[0].host_pattern.as_deref(), Some("web*"));
        assert_eq!(rules[0].runas_user.as_deref(), Some("root"));
        assert_eq!(rules[0].runas_group.as_deref(), Some("wheel"));
        assert_eq!(rules[0].command_pattern, "/usr/bin/systemctl");
        assert!(rules[0].options.nopasswd);

        assert_eq!(rules[1].command_pattern, "!/bin/sh");
        assert!(rules[1].options.nopasswd);
    }

    #[test]
    fn host_and_runas_are_optional() {
        let rules = parse_rules("%wheel ALL = ALL");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].user_pattern, "%wheel");
        assert_eq!(rules[0].host_pattern.as_deref(), Some("ALL"));
        assert_eq!(rules[0].runas_user, None);
        assert_eq!(rules[0].command_pattern, "ALL");
        assert!(!rules[0].options.nopasswd);

        let rules = parse_rules("bob = /usr/bin/id");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].host_pattern, None);
    }

    #[test]
    fn comments_and_defaults_are_skipped() {
        let doc = "# a comment\n\
                   Defaults env_reset\n\
                   \n\
                   carol ALL = NOEXEC: /usr/bin/less  # trailing comment\n";
        let rules = parse_rules(doc);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].command_pattern, "/usr/bin/less");
        assert!(rules[0].options.noexec);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let doc = "this is not a rule\n\
                   alice ALL = /bin/ls\n\
                   also = \n";
        let rules = parse_rules(doc);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].command_pattern, "/bin/ls");
    }

    #[test]
    fn missing_file_yields_no_rules() {
        let source = FileRules::new("/nonexistent/sudosh-test.rules");
        assert!(source.load_rules("alice").is_empty());
    }

    #[test]
    fn admin_fallback_grants_all_with_auth() {
        struct WheelOnly;
        impl Groups for WheelOnly {
            fn is_member(&self, user: &str, group: &str) -> bool {
                user == "alice" && group == "wheel"
            }
        }

        let rules = admin_group_fallback("alice", &WheelOnly);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].command_pattern, "ALL");
        assert!(!rules[0].options.nopasswd);

        assert!(admin_group_fallback("mallory", &WheelOnly).is_empty());
    }
}
