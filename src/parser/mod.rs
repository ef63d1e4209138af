#![forbid(unsafe_code)]
//! Defensive decomposition of raw input lines into commands and pipelines.
//!
//! The grammar accepted here is deliberately tiny: one command with at most
//! one redirection, or a pipeline of whitelisted commands. Everything that
//! smells like shell composition (`;`, `&&`, `$()`, backticks, `&`) is
//! rejected outright rather than interpreted.

use std::fmt;

mod pipeline;
mod redirect;
mod tokenizer;

pub use pipeline::{is_pipeline, parse_pipeline, validate_secure_pipeline, Pipeline};
pub use redirect::{is_safe_target, validate_redirection_in};
use tokenizer::{tokenize, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    ForbiddenOperator(&'static str),
    MissingRedirectTarget,
    MultipleRedirects,
    UnsafeRedirect(String),
    EmbeddedNul,
    MisplacedRedirect,
    EmptyPipelineStage,
    NotAPipeline,
    ForbiddenPipelineCommand(String),
    DangerousFindOption(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::ForbiddenOperator(op) => {
                write!(f, "shell operator '{op}' is not allowed")
            }
            ParseError::MissingRedirectTarget => f.write_str("missing redirect target"),
            ParseError::MultipleRedirects => f.write_str("multiple redirection operators"),
            ParseError::UnsafeRedirect(target) => {
                write!(f, "redirection to {target:?} is not allowed")
            }
            ParseError::EmbeddedNul => f.write_str("input contains a NUL byte"),
            ParseError::MisplacedRedirect => {
                f.write_str("redirection is only allowed on the first or last pipeline stage")
            }
            ParseError::EmptyPipelineStage => f.write_str("empty command in pipeline"),
            ParseError::NotAPipeline => f.write_str("input is not a pipeline"),
            ParseError::ForbiddenPipelineCommand(name) => {
                write!(f, "command '{name}' is not allowed in pipelines")
            }
            ParseError::DangerousFindOption(opt) => {
                write!(f, "dangerous find option '{opt}' not allowed in pipelines")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    Output,
    OutputAppend,
    Input,
}

impl RedirectKind {
    pub fn operator(self) -> &'static str {
        match self {
            RedirectKind::Output => ">",
            RedirectKind::OutputAppend => ">>",
            RedirectKind::Input => "<",
        }
    }

    pub fn append(self) -> bool {
        matches!(self, RedirectKind::OutputAppend)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: String,
}

/// A single validated command: an argv plus at most one redirection whose
/// target has already passed the safety check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub argv: Vec<String>,
    pub redirect: Option<Redirect>,
}

impl Command {
    /// Empty input parses to an empty command; callers treat it as a no-op.
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// The path-stripped name of the program.
    pub fn basename(&self) -> Option<&str> {
        self.argv.first().map(|arg0| strip_path(arg0))
    }

    /// Canonical re-serialization; parsing the result again yields an equal
    /// command. Arguments containing whitespace are single-quoted.
    pub fn to_line(&self) -> String {
        let mut line = String::new();
        for (i, arg) in self.argv.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        if let Some(redirect) = &self.redirect {
            line.push(' ');
            line.push_str(redirect.kind.operator());
            line.push(' ');
            line.push_str(&redirect.target);
        }
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

pub(crate) fn strip_path(arg0: &str) -> &str {
    arg0.rsplit('/').next().unwrap_or(arg0)
}

/// Parse a single command line. Shell control operators and pipes fail the
/// parse; a redirection target is vetted before the command is returned.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let tokens = tokenize(line)?;
    command_from_tokens(tokens)
}

fn command_from_tokens(tokens: Vec<Token>) -> Result<Command, ParseError> {
    let mut argv = Vec::new();
    let mut redirect: Option<Redirect> = None;
    let mut target_parts: Vec<String> = Vec::new();

    for token in tokens {
        match token {
            Token::Word(word) => {
                if redirect.is_some() {
                    // everything after the operator belongs to the target
                    target_parts.push(word);
                } else {
                    argv.push(word);
                }
            }
            Token::Redirect(kind) => {
                if redirect.is_some() {
                    return Err(ParseError::MultipleRedirects);
                }
                redirect = Some(Redirect {
                    kind,
                    target: String::new(),
                });
            }
        }
    }

    if let Some(redirect) = &mut redirect {
        let target = target_parts.join(" ");
        let target = target.trim();
        if target.is_empty() {
            return Err(ParseError::MissingRedirectTarget);
        }
        if !redirect::is_safe_target(target) {
            return Err(ParseError::UnsafeRedirect(target.to_string()));
        }
        redirect.target = target.to_string();
    }

    Ok(Command { argv, redirect })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn argv(cmd: &Command) -> Vec<&str> {
        cmd.argv.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn parses_a_plain_command() {
        let cmd = parse_command("systemctl status nginx").unwrap();
        assert_eq!(argv(&cmd), ["systemctl", "status", "nginx"]);
        assert_eq!(cmd.redirect, None);
        assert_eq!(cmd.basename(), Some("systemctl"));
    }

    #[test]
    fn strips_path_for_basename() {
        let cmd = parse_command("/usr/bin/ls -l").unwrap();
        assert_eq!(cmd.basename(), Some("ls"));
    }

    #[test]
    fn quoted_metacharacters_are_literal() {
        let cmd = parse_command("echo 'a;b' \"c|d\"").unwrap();
        assert_eq!(argv(&cmd), ["echo", "a;b", "c|d"]);
    }

    #[test]
    fn rejects_chaining_operators() {
        assert_eq!(
            parse_command("ls; rm -rf /"),
            Err(ParseError::ForbiddenOperator(";"))
        );
        assert_eq!(
            parse_command("true && reboot"),
            Err(ParseError::ForbiddenOperator("&&"))
        );
        assert_eq!(
            parse_command("false || reboot"),
            Err(ParseError::ForbiddenOperator("||"))
        );
        assert_eq!(
            parse_command("sleep 10 &"),
            Err(ParseError::ForbiddenOperator("&"))
        );
        assert_eq!(
            parse_command("echo `id`"),
            Err(ParseError::ForbiddenOperator("`"))
        );
        assert_eq!(
            parse_command("echo $(id)"),
            Err(ParseError::ForbiddenOperator("$("))
        );
        assert_eq!(
            parse_command("ls | wc -l"),
            Err(ParseError::ForbiddenOperator("|"))
        );
    }

    #[test]
    fn parses_output_redirect() {
        let cmd = parse_command("echo hello > /tmp/out.txt").unwrap();
        assert_eq!(argv(&cmd), ["echo", "hello"]);
        let redirect = cmd.redirect.unwrap();
        assert_eq!(redirect.kind, RedirectKind::Output);
        assert_eq!(redirect.target, "/tmp/out.txt");
    }

    #[test]
    fn parses_append_and_input_redirects() {
        let cmd = parse_command("cat >> /tmp/log.txt").unwrap();
        assert_eq!(cmd.redirect.unwrap().kind, RedirectKind::OutputAppend);

        let cmd = parse_command("wc -l < notes.txt").unwrap();
        let redirect = cmd.redirect.unwrap();
        assert_eq!(redirect.kind, RedirectKind::Input);
        assert_eq!(redirect.target, "notes.txt");
    }

    #[test]
    fn rejects_multiple_redirects() {
        assert_eq!(
            parse_command("cat < a.txt > b.txt"),
            Err(ParseError::MultipleRedirects)
        );
    }

    #[test]
    fn rejects_missing_redirect_target() {
        assert_eq!(
            parse_command("echo hello >"),
            Err(ParseError::MissingRedirectTarget)
        );
        assert_eq!(
            parse_command("echo hello >   "),
            Err(ParseError::MissingRedirectTarget)
        );
    }

    #[test]
    fn rejects_unsafe_redirect_target() {
        assert_eq!(
            parse_command("echo pwned > /etc/passwd"),
            Err(ParseError::UnsafeRedirect("/etc/passwd".to_string()))
        );
    }

    #[test]
    fn empty_input_is_a_noop_command() {
        let cmd = parse_command("").unwrap();
        assert!(cmd.is_empty());
        let cmd = parse_command("   ").unwrap();
        assert!(cmd.is_empty());
    }

    #[test]
    fn rejects_embedded_nul() {
        assert_eq!(parse_command("ls \0 -l"), Err(ParseError::EmbeddedNul));
    }

    #[test]
    fn reparsing_the_canonical_form_is_idempotent() {
        for line in [
            "ls -l /var",
            "echo 'hello world' > /tmp/out.txt",
            "tail -n 5 < notes.txt",
            "grep pattern file.txt",
        ] {
            let first = parse_command(line).unwrap();
            let second = parse_command(&first.to_line()).unwrap();
            assert_eq!(first, second);
        }
    }
}
