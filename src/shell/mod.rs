//! The interactive shell: read a line, parse it, authorize it, run it.
//!
//! Every line goes through the same pipeline: parse (rejecting shell
//! composition), resolve the program against the secure search path,
//! authorize against the rule set, authenticate if required, execute, and
//! audit the outcome. A failure at any step denies the line; the loop
//! itself never terminates on a denied command.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};

use crate::cache::{AuthCache, CacheEntry};
use crate::common::{Context, Error, SECURE_PATH};
use crate::danger;
use crate::environ;
use crate::log::{audit, user_error, user_info, user_warn, AuditEvent, SudoshLogger};
use crate::parser::{
    self, Command, Pipeline, Redirect, RedirectKind,
};
use crate::policy::{Authenticator, Authorization, Interactive, Policy};
use crate::rules::source::{admin_group_fallback, FileRules, NssGroups};
use crate::rules::{Query, RuleOptions, RuleSource, SudoRule};
use crate::system;

pub fn main() {
    SudoshLogger::new("sudosh: ").into_global_logger();

    match parse_invocation(std::env::args().skip(1)).and_then(run) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            user_error!("{error}");
            std::process::exit(1);
        }
    }
}

/// Session-level settings from the command line. Everything else is policy.
#[derive(Default)]
struct Invocation {
    runas_user: Option<String>,
    runas_group: Option<String>,
    verbose: bool,
}

fn parse_invocation(mut args: impl Iterator<Item = String>) -> Result<Invocation, Error> {
    let mut invocation = Invocation::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-v" | "--verbose" => invocation.verbose = true,
            "-u" | "--user" => {
                invocation.runas_user = Some(args.next().ok_or_else(|| {
                    Error::Configuration(format!("'{arg}' requires a username"))
                })?);
            }
            "-g" | "--group" => {
                invocation.runas_group = Some(args.next().ok_or_else(|| {
                    Error::Configuration(format!("'{arg}' requires a group name"))
                })?);
            }
            other => {
                return Err(Error::Configuration(format!(
                    "unexpected argument '{other}'"
                )));
            }
        }
    }
    Ok(invocation)
}

fn run(invocation: Invocation) -> Result<i32, Error> {
    let mut context = Context::current()?;
    context.runas_user = invocation.runas_user;
    context.runas_group = invocation.runas_group;
    context.verbose = invocation.verbose;

    let cache = AuthCache::with_dir(AuthCache::DEFAULT_DIR, context.cache_timeout);
    if let Err(error) = cache.sweep() {
        user_warn!("could not sweep the authentication cache: {error}");
    }

    audit(AuditEvent::SessionStart {
        username: &context.username,
        tty: context.tty_label(),
    });

    let interactive = context.tty.is_some();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if interactive {
            write!(stdout, "sudosh> ").ok();
            stdout.flush().ok();
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => return Err(Error::Io(None, error)),
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        if line == "help" {
            print_help();
            continue;
        }

        if let Err(error) = dispatch(&context, &cache, line) {
            user_error!("{error}");
        }
    }

    audit(AuditEvent::SessionEnd {
        username: &context.username,
    });
    Ok(0)
}

fn print_help() {
    println_ignore_io_error!("Type a command to run it with elevated privileges.");
    println_ignore_io_error!(
        "Single commands may carry one redirection (>, >>, <) to a safe location."
    );
    println_ignore_io_error!("Pipelines are limited to a whitelist of read-only commands.");
    println_ignore_io_error!("Shell control operators (;, &&, ||, &, $(), `) are rejected.");
    println_ignore_io_error!("Builtins: help, exit, quit.");
}

/// Parse, authorize and run one input line.
fn dispatch(context: &Context, cache: &AuthCache, line: &str) -> Result<(), Error> {
    let rules = load_rules(&context.username);
    let policy = Policy {
        rules: &rules,
        groups: &NssGroups,
        environment: environ::detect(),
        now: system::unix_now(),
    };

    if parser::is_pipeline(line) {
        let pipeline = match parser::parse_pipeline(line) {
            Ok(pipeline) => pipeline,
            Err(error) => return Err(reject(context, line, error)),
        };
        run_pipeline(context, cache, &policy, &pipeline)
    } else {
        let command = match parser::parse_command(line) {
            Ok(command) => command,
            Err(error) => return Err(reject(context, line, error)),
        };
        if command.is_empty() {
            return Ok(());
        }
        run_single(context, cache, &policy, &command)
    }
}

fn reject(context: &Context, line: &str, error: parser::ParseError) -> Error {
    audit(AuditEvent::SecurityViolation {
        username: &context.username,
        detail: &format!("{error}: {line}"),
    });
    Error::Parse(error)
}

/// The rule set in force for one decision. The policy file is re-read every
/// time; users without configured rules fall back to the administrative
/// group grant.
fn load_rules(username: &str) -> Vec<SudoRule> {
    let rules = FileRules::new(FileRules::DEFAULT_PATH).load_rules(username);
    if rules.is_empty() {
        admin_group_fallback(username, &NssGroups)
    } else {
        rules
    }
}

fn run_single(
    context: &Context,
    cache: &AuthCache,
    policy: &Policy,
    command: &Command,
) -> Result<(), Error> {
    let program = resolve_stage(context, command)?;
    let line = resolved_line(command, &program);
    let options = authorize(context, policy, std::slice::from_ref(&line))?;
    if context.verbose {
        user_info!(
            "permitted: {line} ({})",
            danger::explain(danger::classify(&line))
        );
    }
    ensure_authenticated(context, cache, policy, std::slice::from_ref(&line), &options)?;

    let status = spawn_single(command, &program, &options)
        .and_then(|mut child| child.wait())
        .map_err(|error| Error::Io(Some(program.clone()), error))?;

    audit(AuditEvent::CommandRun {
        username: &context.username,
        command: &line,
        exit_code: status.code(),
    });
    report_signal_exit(&status);
    Ok(())
}

fn run_pipeline(
    context: &Context,
    cache: &AuthCache,
    policy: &Policy,
    pipeline: &Pipeline,
) -> Result<(), Error> {
    let programs = pipeline
        .stages
        .iter()
        .map(|stage| resolve_stage(context, stage))
        .collect::<Result<Vec<_>, _>>()?;
    let stage_lines: Vec<String> = pipeline
        .stages
        .iter()
        .zip(&programs)
        .map(|(stage, program)| resolved_line(stage, program))
        .collect();
    let options = authorize(context, policy, &stage_lines)?;
    if context.verbose {
        user_info!("permitted pipeline: {}", stage_lines.join(" | "));
    }
    ensure_authenticated(context, cache, policy, &stage_lines, &options)?;

    let status = spawn_pipeline(pipeline, &programs, &options).map_err(Error::from)?;

    audit(AuditEvent::PipelineRun {
        username: &context.username,
        stages: &stage_lines,
        exit_code: status.code(),
    });
    report_signal_exit(&status);
    Ok(())
}

/// Authorize every stage; a pipeline runs only if each of its commands would
/// be allowed on its own. The folded options of the first stage govern the
/// environment of the whole job.
fn authorize(
    context: &Context,
    policy: &Policy,
    stage_lines: &[String],
) -> Result<RuleOptions, Error> {
    let mut first_options = None;
    for line in stage_lines {
        match policy.authorize(&stage_query(context, line)) {
            Authorization::Denied => {
                audit(AuditEvent::CommandDenied {
                    username: &context.username,
                    command: line,
                    reason: "no matching rule",
                });
                return Err(Error::NotAllowed {
                    username: context.username.clone(),
                    command: line.clone(),
                    hostname: context.hostname.clone(),
                });
            }
            Authorization::Allowed { options, .. } => {
                first_options.get_or_insert(options);
            }
        }
    }
    Ok(first_options.unwrap_or_default())
}

fn ensure_authenticated(
    context: &Context,
    cache: &AuthCache,
    policy: &Policy,
    stage_lines: &[String],
    options: &RuleOptions,
) -> Result<(), Error> {
    // a rule-supplied timestamp timeout narrows or widens the cache window
    // for this decision only
    let window_override = options.timestamp_timeout.map(|t| cache.with_timeout(t));
    let cache = window_override.as_ref().unwrap_or(cache);

    let must_authenticate = stage_lines
        .iter()
        .any(|line| policy.requires_auth(&stage_query(context, line)));
    if !must_authenticate {
        audit(AuditEvent::AuthSkipped {
            username: &context.username,
        });
        return Ok(());
    }

    let entry = CacheEntry {
        username: context.username.clone(),
        tty: context.tty_label().to_string(),
        hostname: context.fqdn().to_string(),
        uid: context.uid,
        gid: context.gid,
        session_id: context.process.session_id,
        timestamp: system::unix_now(),
    };

    if cache.check(&entry) {
        audit(AuditEvent::AuthCached {
            username: &context.username,
        });
        return Ok(());
    }

    if !Interactive.authenticate(&context.username) {
        audit(AuditEvent::AuthFailed {
            username: &context.username,
        });
        // a failed attempt also revokes whatever proof was cached
        cache.clear(&context.username, context.tty_label());
        return Err(Error::auth("incorrect password attempt"));
    }

    audit(AuditEvent::AuthGranted {
        username: &context.username,
    });
    if let Err(error) = cache.update(&entry) {
        user_warn!("could not record the authentication: {error}");
    }
    Ok(())
}

fn stage_query<'a>(context: &'a Context, line: &'a str) -> Query<'a> {
    Query {
        username: &context.username,
        short_host: context.short_host(),
        fqdn: context.fqdn(),
        runas_user: context.runas_user.as_deref(),
        runas_group: context.runas_group.as_deref(),
        command: line,
    }
}

/// The command line as authorized and audited: the resolved program path
/// followed by the typed arguments.
fn resolved_line(stage: &Command, program: &Path) -> String {
    let mut resolved = stage.clone();
    if let Some(arg0) = resolved.argv.first_mut() {
        *arg0 = program.to_string_lossy().into_owned();
    }
    resolved.to_line()
}

/// Resolve a stage's program against the secure search path. An unresolvable
/// program is a denial, not an execution error.
fn resolve_stage(context: &Context, stage: &Command) -> Result<PathBuf, Error> {
    let name = stage.argv.first().map(String::as_str).unwrap_or("");
    match resolve_program(name, SECURE_PATH) {
        Some(program) => Ok(program),
        None => {
            audit(AuditEvent::CommandDenied {
                username: &context.username,
                command: &stage.to_line(),
                reason: "not found in the secure search path",
            });
            Err(Error::CommandNotFound(name.to_string()))
        }
    }
}

/// Only absolute paths and names found under the secure search path resolve;
/// the caller's PATH is never consulted.
fn resolve_program(name: &str, search_path: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.contains('/') {
        let path = PathBuf::from(name);
        return if path.is_file() { Some(path) } else { None };
    }

    search_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(name))
        .find(|candidate| candidate.is_file())
}

fn spawn_single(
    command: &Command,
    program: &Path,
    options: &RuleOptions,
) -> io::Result<Child> {
    let mut process = prepared_process(program, &command.argv[1..], options);
    if let Some(redirect) = &command.redirect {
        match redirect.kind {
            RedirectKind::Input => {
                process.stdin(open_input(redirect)?);
            }
            RedirectKind::Output | RedirectKind::OutputAppend => {
                process.stdout(open_output(redirect)?);
            }
        }
    }
    process.spawn()
}

/// Spawn the stages left to right, each reading the previous stage's stdout.
/// The reported status is that of the final stage.
fn spawn_pipeline(
    pipeline: &Pipeline,
    programs: &[PathBuf],
    options: &RuleOptions,
) -> io::Result<ExitStatus> {
    let last = pipeline.stages.len() - 1;
    let mut children: Vec<Child> = Vec::with_capacity(pipeline.stages.len());

    for (i, stage) in pipeline.stages.iter().enumerate() {
        let mut process = prepared_process(&programs[i], &stage.argv[1..], options);

        if i == 0 {
            if let Some(redirect) = &stage.redirect {
                if redirect.kind == RedirectKind::Input {
                    process.stdin(open_input(redirect)?);
                }
            }
        } else {
            let upstream = children[i - 1].stdout.take().ok_or_else(|| {
                io::Error::new(io::ErrorKind::Other, "pipeline stage lost its output")
            })?;
            process.stdin(Stdio::from(upstream));
        }

        if i == last {
            if let Some(redirect) = &stage.redirect {
                if redirect.kind != RedirectKind::Input {
                    process.stdout(open_output(redirect)?);
                }
            }
        } else {
            process.stdout(Stdio::piped());
        }

        children.push(process.spawn()?);
    }

    let mut status = None;
    for mut child in children {
        status = Some(child.wait()?);
    }
    status.ok_or_else(|| io::Error::new(io::ErrorKind::Other, "empty pipeline"))
}

/// A process builder with the environment policy applied: the search path is
/// always the secure one, and `env_reset` strips everything except the
/// identity and terminal variables.
fn prepared_process(program: &Path, args: &[String], options: &RuleOptions) -> std::process::Command {
    let mut process = std::process::Command::new(program);
    process.args(args);

    if options.env_reset {
        process.env_clear();
        for keep in ["HOME", "USER", "LOGNAME", "TERM", "LANG"] {
            if let Ok(value) = std::env::var(keep) {
                process.env(keep, value);
            }
        }
    }
    process.env(
        "PATH",
        options.secure_path.as_deref().unwrap_or(SECURE_PATH),
    );

    process
}

fn open_input(redirect: &Redirect) -> io::Result<File> {
    File::open(&redirect.target)
}

fn open_output(redirect: &Redirect) -> io::Result<File> {
    if redirect.kind.append() {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&redirect.target)
    } else {
        File::create(&redirect.target)
    }
}

fn report_signal_exit(status: &ExitStatus) {
    if status.code().is_none() {
        user_warn!("command terminated by a signal");
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_invocation, resolve_program};

    fn args<'a>(list: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
        list.iter().map(|s| s.to_string())
    }

    #[test]
    fn invocation_flags_parse() {
        let invocation = parse_invocation(args(&["-v", "-u", "postgres", "-g", "backup"])).unwrap();
        assert!(invocation.verbose);
        assert_eq!(invocation.runas_user.as_deref(), Some("postgres"));
        assert_eq!(invocation.runas_group.as_deref(), Some("backup"));

        let invocation = parse_invocation(args(&[])).unwrap();
        assert!(!invocation.verbose);
        assert_eq!(invocation.runas_user, None);
    }

    #[test]
    fn invocation_rejects_bad_arguments() {
        assert!(parse_invocation(args(&["-u"])).is_err());
        assert!(parse_invocation(args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn resolution_ignores_missing_entries() {
        assert_eq!(resolve_program("", "/bin:/usr/bin"), None);
        assert_eq!(
            resolve_program("no-such-command-sudosh-test", "/bin:/usr/bin"),
            None
        );
        assert_eq!(resolve_program("/no/such/path", "/bin:/usr/bin"), None);
    }

    #[test]
    fn absolute_paths_skip_the_search_path() {
        // resolvable on any Linux system
        if std::path::Path::new("/bin/sh").is_file() {
            assert_eq!(
                resolve_program("/bin/sh", "/nonexistent"),
                Some(std::path::PathBuf::from("/bin/sh"))
            );
        }
    }

    #[test]
    fn relative_names_resolve_through_the_given_path() {
        if std::path::Path::new("/bin/sh").is_file() {
            assert_eq!(
                resolve_program("sh", "/nonexistent:/bin"),
                Some(std::path::PathBuf::from("/bin/sh"))
            );
        }
    }
}
