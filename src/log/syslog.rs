use super::{Level, Log};
use crate::system::syslog;

// syslogd implementations commonly truncate somewhere past this point
const MAX_MSG_LEN: usize = 960;

pub struct Syslog;

impl Log for Syslog {
    fn log(&self, level: Level, args: &std::fmt::Arguments<'_>) {
        let priority = match level {
            Level::Error => libc::LOG_ERR,
            Level::Warn => libc::LOG_WARNING,
            Level::Info => libc::LOG_INFO,
            Level::Debug | Level::Trace => libc::LOG_DEBUG,
        };

        let message = args.to_string();
        if message.len() <= MAX_MSG_LEN {
            syslog(priority, libc::LOG_AUTH, &message);
            return;
        }

        // longer messages are split into multiple records, breaking at a
        // character boundary and marking the continuation on both sides
        let mut rest = message.as_str();
        let mut first = true;
        while !rest.is_empty() {
            let budget = if first {
                MAX_MSG_LEN - "[...]".len()
            } else {
                MAX_MSG_LEN - 2 * "[...]".len() - 1
            };

            if rest.len() <= budget {
                syslog(priority, libc::LOG_AUTH, &format!("[...] {rest}"));
                break;
            }

            let mut cut = budget.min(rest.len());
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            // prefer breaking at whitespace so words stay intact
            if let Some(ws) = rest[..cut].rfind(char::is_whitespace) {
                if ws > 0 {
                    cut = ws;
                }
            }

            let chunk = &rest[..cut];
            if first {
                syslog(priority, libc::LOG_AUTH, &format!("{chunk}[...]"));
            } else {
                syslog(priority, libc::LOG_AUTH, &format!("[...] {chunk}[...]"));
            }

            rest = rest[cut..].trim_start();
            first = false;
        }
    }

    fn flush(&self) {
        // pass
    }
}

#[cfg(test)]
mod tests {
    use super::{Level, Log, Syslog};

    #[test]
    fn can_write_to_syslog() {
        Syslog.log(Level::Info, &format_args!("authorization check passed"));
    }

    #[test]
    fn can_write_a_long_message() {
        let long = "word ".repeat(500);
        Syslog.log(Level::Info, &format_args!("{long}"));
    }
}
