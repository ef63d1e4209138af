use super::{auth_info, auth_warn};

/// Semantic audit events emitted by the authorization core. Rendering them
/// into log records happens here so user-controlled strings are only ever
/// interpolated as display arguments, never as format strings.
#[derive(Debug)]
pub enum AuditEvent<'a> {
    SessionStart {
        username: &'a str,
        tty: &'a str,
    },
    SessionEnd {
        username: &'a str,
    },
    AuthSkipped {
        username: &'a str,
    },
    AuthCached {
        username: &'a str,
    },
    AuthGranted {
        username: &'a str,
    },
    AuthFailed {
        username: &'a str,
    },
    CommandRun {
        username: &'a str,
        command: &'a str,
        exit_code: Option<i32>,
    },
    PipelineRun {
        username: &'a str,
        stages: &'a [String],
        exit_code: Option<i32>,
    },
    CommandDenied {
        username: &'a str,
        command: &'a str,
        reason: &'a str,
    },
    SecurityViolation {
        username: &'a str,
        detail: &'a str,
    },
}

pub fn audit(event: AuditEvent) {
    match event {
        AuditEvent::SessionStart { username, tty } => {
            auth_info!("SESSION_START: user={username} tty={tty}");
        }
        AuditEvent::SessionEnd { username } => {
            auth_info!("SESSION_END: user={username}");
        }
        AuditEvent::AuthSkipped { username } => {
            auth_info!("AUTH_SKIPPED: user={username} reason=nopasswd");
        }
        AuditEvent::AuthCached { username } => {
            auth_info!("AUTH_CACHED: user={username}");
        }
        AuditEvent::AuthGranted { username } => {
            auth_info!("AUTH_SUCCESS: user={username}");
        }
        AuditEvent::AuthFailed { username } => {
            auth_warn!("AUTH_FAILURE: user={username}");
        }
        AuditEvent::CommandRun {
            username,
            command,
            exit_code,
        } => {
            auth_info!(
                "COMMAND: user={username} command={command:?} exit_code={}",
                exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
            );
        }
        AuditEvent::PipelineRun {
            username,
            stages,
            exit_code,
        } => {
            auth_info!(
                "PIPELINE_START: user={username} commands={}",
                stages.len()
            );
            for (i, stage) in stages.iter().enumerate() {
                auth_info!("PIPELINE_CMD[{i}]: user={username} command={stage:?}");
            }
            auth_info!(
                "PIPELINE_COMPLETE: user={username} commands={} exit_code={}",
                stages.len(),
                exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
            );
        }
        AuditEvent::CommandDenied {
            username,
            command,
            reason,
        } => {
            auth_warn!("COMMAND_DENIED: user={username} command={command:?} reason={reason}");
        }
        AuditEvent::SecurityViolation { username, detail } => {
            auth_warn!("SECURITY_VIOLATION: user={username} detail={detail:?}");
        }
    }
}
