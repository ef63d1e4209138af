#![forbid(unsafe_code)]
//! The sudoers-equivalent rule evaluator.
//!
//! [`evaluate`] is a state-free function over an immutable rule list and a
//! query tuple. Rules are filtered on user, host, runas and time window,
//! sorted by ascending order, and their command patterns tested against the
//! query. A matching negated pattern sets a deny flag that overrides any
//! allow, no matter where in the order either match occurred.

use std::fmt;

mod host;
pub mod source;

pub use source::RuleSource;

/// Group membership lookups are a directory-service concern; the evaluator
/// only needs a yes/no answer.
pub trait Groups {
    fn is_member(&self, user: &str, group: &str) -> bool;
}

/// A lookup that knows no groups; `%group` patterns never match through it.
pub struct NoGroups;

impl Groups for NoGroups {
    fn is_member(&self, _user: &str, _group: &str) -> bool {
        false
    }
}

/// Option flags and settings attached to a rule. Unset fields never
/// overwrite a value set by an earlier rule during the fold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOptions {
    pub nopasswd: bool,
    pub env_reset: bool,
    pub noexec: bool,
    pub secure_path: Option<String>,
    pub env_keep: Option<String>,
    pub env_check: Option<String>,
    pub env_delete: Option<String>,
    pub umask: Option<u32>,
    pub timestamp_timeout: Option<i64>,
}

/// One permission record. `order` is ascending priority; rules without an
/// order sort after all ordered rules, keeping their relative list position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SudoRule {
    pub user_pattern: String,
    pub host_pattern: Option<String>,
    pub runas_user: Option<String>,
    pub runas_group: Option<String>,
    pub command_pattern: String,
    pub order: Option<i64>,
    pub not_before: Option<i64>,
    pub not_after: Option<i64>,
    pub options: RuleOptions,
}

/// The tuple a single authorization decision is about.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub username: &'a str,
    pub short_host: &'a str,
    pub fqdn: &'a str,
    pub runas_user: Option<&'a str>,
    pub runas_group: Option<&'a str>,
    pub command: &'a str,
}

impl Query<'_> {
    fn effective_runas_user(&self) -> &str {
        self.runas_user.unwrap_or("root")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgement {
    Allow,
    Deny,
}

impl fmt::Display for Judgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Judgement::Allow => f.write_str("allow"),
            Judgement::Deny => f.write_str("deny"),
        }
    }
}

enum CommandMatch {
    Positive,
    Negative,
}

/// Decide whether the query is permitted by the rule set. No matching rules
/// means deny.
pub fn evaluate(rules: &[SudoRule], query: &Query, now: i64, groups: &dyn Groups) -> Judgement {
    if query.username.is_empty() || query.command.is_empty() {
        return Judgement::Deny;
    }

    let mut allow = false;
    let mut deny = false;
    for rule in applicable_rules(rules, query, now, groups) {
        match command_match(&rule.command_pattern, query.command) {
            Some(CommandMatch::Positive) => allow = true,
            Some(CommandMatch::Negative) => deny = true,
            None => {}
        }
    }

    if deny || !allow {
        Judgement::Deny
    } else {
        Judgement::Allow
    }
}

/// Fold the options of every positively matching rule, in ascending order.
/// Boolean flags accumulate with OR; valued fields take the last explicitly
/// set value.
pub fn effective_options(
    rules: &[SudoRule],
    query: &Query,
    now: i64,
    groups: &dyn Groups,
) -> RuleOptions {
    let mut acc = RuleOptions::default();
    if query.username.is_empty() || query.command.is_empty() {
        return acc;
    }

    for rule in applicable_rules(rules, query, now, groups) {
        if !matches!(
            command_match(&rule.command_pattern, query.command),
            Some(CommandMatch::Positive)
        ) {
            continue;
        }

        let opts = &rule.options;
        acc.nopasswd |= opts.nopasswd;
        acc.env_reset |= opts.env_reset;
        acc.noexec |= opts.noexec;
        if opts.secure_path.is_some() {
            acc.secure_path = opts.secure_path.clone();
        }
        if opts.env_keep.is_some() {
            acc.env_keep = opts.env_keep.clone();
        }
        if opts.env_check.is_some() {
            acc.env_check = opts.env_check.clone();
        }
        if opts.env_delete.is_some() {
            acc.env_delete = opts.env_delete.clone();
        }
        if opts.umask.is_some() {
            acc.umask = opts.umask;
        }
        if opts.timestamp_timeout.is_some() {
            acc.timestamp_timeout = opts.timestamp_timeout;
        }
    }

    acc
}

/// True iff the user holds an unconditional NOPASSWD grant for this query:
/// an applicable `ALL` rule carrying NOPASSWD, with no negated pattern in
/// the applicable set matching the command.
pub fn unconditional_nopasswd(
    rules: &[SudoRule],
    query: &Query,
    now: i64,
    groups: &dyn Groups,
) -> bool {
    if query.username.is_empty() || query.command.is_empty() {
        return false;
    }

    let mut grant = false;
    for rule in applicable_rules(rules, query, now, groups) {
        if rule.command_pattern == "ALL" && rule.options.nopasswd {
            grant = true;
        }
        if matches!(
            command_match(&rule.command_pattern, query.command),
            Some(CommandMatch::Negative)
        ) {
            // a negation defeats the unconditional grant
            return false;
        }
    }
    grant
}

fn applicable_rules<'a>(
    rules: &'a [SudoRule],
    query: &Query,
    now: i64,
    groups: &dyn Groups,
) -> Vec<&'a SudoRule> {
    let mut applicable: Vec<&SudoRule> = rules
        .iter()
        .filter(|rule| rule_applies(rule, query, now, groups))
        .collect();
    // stable sort: equal and unset orders keep their list position
    applicable.sort_by_key(|rule| rule.order.unwrap_or(i64::MAX));
    applicable
}

fn rule_applies(rule: &SudoRule, query: &Query, now: i64, groups: &dyn Groups) -> bool {
    user_matches(&rule.user_pattern, query.username, groups)
        && host_matches(rule.host_pattern.as_deref(), query)
        && runas_matches(rule, query)
        && time_window_contains(rule, now)
}

fn user_matches(pattern: &str, username: &str, groups: &dyn Groups) -> bool {
    if pattern == "ALL" {
        return true;
    }
    if let Some(group) = pattern.strip_prefix('%') {
        return groups.is_member(username, group);
    }
    pattern == username
}

fn host_matches(pattern: Option<&str>, query: &Query) -> bool {
    match pattern {
        // a rule without a host applies everywhere
        None => true,
        Some(pattern) => host::matches(pattern, query.short_host, query.fqdn),
    }
}

fn runas_matches(rule: &SudoRule, query: &Query) -> bool {
    let target_user = query.effective_runas_user();
    let user_ok = match rule.runas_user.as_deref() {
        // no runas spec means the classic default target
        None => target_user == "root",
        Some("ALL") => true,
        Some(user) => user == target_user,
    };

    let group_ok = match (rule.runas_group.as_deref(), query.runas_group) {
        // an unset rule group is "don't care", not "no group"
        (None, _) => true,
        (Some("ALL"), _) => true,
        (Some(group), Some(target_group)) => group == target_group,
        (Some(_), None) => false,
    };

    user_ok && group_ok
}

fn time_window_contains(rule: &SudoRule, now: i64) -> bool {
    rule.not_before.map_or(true, |t| now >= t) && rule.not_after.map_or(true, |t| now <= t)
}

fn command_match(pattern: &str, command: &str) -> Option<CommandMatch> {
    let (body, negated) = match pattern.strip_prefix('!') {
        Some(body) => (body.trim_start(), true),
        None => (pattern, false),
    };

    if command_pattern_matches(body, command) {
        Some(if negated {
            CommandMatch::Negative
        } else {
            CommandMatch::Positive
        })
    } else {
        None
    }
}

/// A pattern is tried against the whole command line, against the program
/// path alone, and against the program basename, literally first and then as
/// a glob. Globs never match across a path separator.
fn command_pattern_matches(body: &str, command: &str) -> bool {
    if body == "ALL" {
        return true;
    }

    let program = command.split_whitespace().next().unwrap_or("");
    let program_base = crate::parser::strip_path(program);
    if body == command || body == program || body == program_base {
        return true;
    }

    if body.contains(['*', '?', '[']) {
        if let Ok(pattern) = glob::Pattern::new(body) {
            let options = glob::MatchOptions {
                require_literal_separator: true,
                ..Default::default()
            };
            return pattern.matches_with(command, options)
                || pattern.matches_with(program, options)
                || pattern.matches_with(program_base, options);
        }
    }

    false
}
