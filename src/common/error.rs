use crate::parser::ParseError;
use crate::system::Hostname;
use std::{fmt, path::PathBuf};

#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    NotAllowed {
        username: String,
        command: String,
        hostname: Hostname,
    },
    Authentication(String),
    CommandNotFound(String),
    UserNotFound(String),
    Configuration(String),
    Io(Option<PathBuf>, std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{e}"),
            Error::NotAllowed {
                username,
                command,
                hostname,
            } => {
                write!(
                    f,
                    "Sorry, user {username} may not run {command} on {hostname}.",
                )
            }
            Error::Authentication(e) => write!(f, "authentication failed: {e}"),
            Error::CommandNotFound(name) => write!(f, "{name}: command not found"),
            Error::UserNotFound(u) => write!(f, "user '{u}' not found"),
            Error::Configuration(e) => write!(f, "invalid configuration: {e}"),
            Error::Io(location, e) => {
                if let Some(path) = location {
                    write!(f, "cannot access '{}': {e}", path.display())
                } else {
                    write!(f, "IO error: {e}")
                }
            }
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(None, err)
    }
}

impl Error {
    pub fn auth(message: &str) -> Self {
        Self::Authentication(message.to_string())
    }
}
