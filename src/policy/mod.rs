#![forbid(unsafe_code)]
//! The authorization policy: combines the rule evaluator, the danger
//! classifier and the session environment into a single decision per
//! command, including whether authentication is required.

use crate::danger::{self, DangerTier};
use crate::environ::EnvironmentInfo;
use crate::log::auth_warn;
use crate::rules::{self, Groups, Judgement, Query, RuleOptions, SudoRule};

/// How a user proves their identity. The policy only needs a verdict;
/// prompting and credential checking live behind this trait.
pub trait Authenticator {
    fn authenticate(&self, username: &str) -> bool;
}

/// An authenticator with a fixed answer, for sessions where the verdict is
/// established elsewhere and for tests.
pub struct Deterministic(pub bool);

impl Authenticator for Deterministic {
    fn authenticate(&self, _username: &str) -> bool {
        self.0
    }
}

/// Interactive authentication against the system. Until a PAM conversation
/// is wired in, this refuses rather than accepting unverified input.
pub struct Interactive;

impl Authenticator for Interactive {
    fn authenticate(&self, username: &str) -> bool {
        auth_warn!("no authentication backend available for {username:?}");
        false
    }
}

/// The outcome of [`Policy::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allowed {
        must_authenticate: bool,
        options: RuleOptions,
    },
    Denied,
}

/// A policy decision context: the rule set in force, the group database,
/// the detected session environment, and the decision time.
pub struct Policy<'a> {
    pub rules: &'a [SudoRule],
    pub groups: &'a dyn Groups,
    pub environment: EnvironmentInfo,
    pub now: i64,
}

impl Policy<'_> {
    /// Authorize one command. Denied queries never reach authentication.
    pub fn authorize(&self, query: &Query) -> Authorization {
        match rules::evaluate(self.rules, query, self.now, self.groups) {
            Judgement::Deny => Authorization::Denied,
            Judgement::Allow => Authorization::Allowed {
                must_authenticate: self.requires_auth(query),
                options: rules::effective_options(self.rules, query, self.now, self.groups),
            },
        }
    }

    /// Whether an allowed query still needs the user to authenticate.
    ///
    /// Editor, IDE and AI-agent sessions are treated as hostile to
    /// credential-free escalation: any command above the safe tier
    /// re-requires authentication there, even under an unconditional
    /// NOPASSWD grant.
    pub fn requires_auth(&self, query: &Query) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let risky_session =
            self.environment.is_editor_session || self.environment.is_ai_session;
        let session_override =
            risky_session && danger::classify(query.command) > DangerTier::Safe;

        if rules::unconditional_nopasswd(self.rules, query, self.now, self.groups) {
            return session_override;
        }
        if session_override {
            return true;
        }

        match rules::evaluate(self.rules, query, self.now, self.groups) {
            Judgement::Deny => true,
            Judgement::Allow => {
                !rules::effective_options(self.rules, query, self.now, self.groups).nopasswd
            }
        }
    }
}
