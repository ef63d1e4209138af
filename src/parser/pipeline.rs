use super::{parse_command, Command, ParseError, RedirectKind};

/// Commands permitted as pipeline stages. Everything else, shells and
/// privilege-escalation tools in particular, fails pipeline validation even
/// when the stage itself parses.
pub const PIPE_SAFE_COMMANDS: &[&str] = &[
    // text processing
    "awk", "sed", "grep", "egrep", "fgrep", "cut", "sort", "uniq", "head", "tail", "tr", "wc",
    "nl", "cat", "tac", "rev",
    // system information
    "ps", "ls", "df", "du", "who", "w", "id", "whoami", "date", "uptime", "uname", "hostname",
    "pwd", "env", "printenv", "echo",
    // pagers
    "less", "more",
    // read-only network tools
    "ping", "traceroute", "nslookup", "dig", "host",
    // file inspection
    "file", "stat", "find", "locate", "which", "whereis", "type",
];

/// `find` is pipe-safe only without its side-effecting options.
const FORBIDDEN_FIND_OPTIONS: &[&str] = &["-exec", "-execdir", "-delete"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Command>,
}

impl Pipeline {
    pub fn to_line(&self) -> String {
        self.stages
            .iter()
            .map(Command::to_line)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// True iff the line contains an unquoted single `|`. `||` is not a pipe.
pub fn is_pipeline(line: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '|' if !in_single && !in_double => {
                if chars.peek() == Some(&'|') {
                    return false;
                }
                return true;
            }
            _ => {}
        }
    }
    false
}

fn split_stages(line: &str) -> Result<Vec<String>, ParseError> {
    let mut stages = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '|' if !in_single && !in_double => {
                if chars.peek() == Some(&'|') {
                    return Err(ParseError::ForbiddenOperator("||"));
                }
                stages.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    stages.push(current);

    Ok(stages)
}

/// Parse and validate a full pipeline: split on unquoted `|`, parse every
/// stage as a single command, then enforce redirection placement and the
/// pipe-safe whitelist.
pub fn parse_pipeline(line: &str) -> Result<Pipeline, ParseError> {
    let raw_stages = split_stages(line)?;
    if raw_stages.len() < 2 {
        return Err(ParseError::NotAPipeline);
    }

    let last = raw_stages.len() - 1;
    let mut stages = Vec::with_capacity(raw_stages.len());
    for (i, raw) in raw_stages.iter().enumerate() {
        if raw.trim().is_empty() {
            return Err(ParseError::EmptyPipelineStage);
        }

        let stage = parse_command(raw)?;
        if stage.is_empty() {
            return Err(ParseError::EmptyPipelineStage);
        }

        if let Some(redirect) = &stage.redirect {
            let allowed = match redirect.kind {
                RedirectKind::Input => i == 0,
                RedirectKind::Output | RedirectKind::OutputAppend => i == last,
            };
            if !allowed {
                return Err(ParseError::MisplacedRedirect);
            }
        }

        check_stage_command(&stage)?;
        stages.push(stage);
    }

    Ok(Pipeline { stages })
}

fn check_stage_command(stage: &Command) -> Result<(), ParseError> {
    let Some(name) = stage.basename() else {
        return Err(ParseError::EmptyPipelineStage);
    };

    if !PIPE_SAFE_COMMANDS.contains(&name) {
        return Err(ParseError::ForbiddenPipelineCommand(name.to_string()));
    }

    if name == "find" {
        for arg in &stage.argv[1..] {
            if FORBIDDEN_FIND_OPTIONS.contains(&arg.as_str()) {
                return Err(ParseError::DangerousFindOption(arg.clone()));
            }
        }
    }

    Ok(())
}

/// Boolean form of pipeline validation for callers that only need a verdict.
pub fn validate_secure_pipeline(line: &str) -> bool {
    parse_pipeline(line).is_ok()
}
