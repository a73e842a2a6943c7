//! Request script parsing.
//!
//! A script is a stream of whitespace separated tokens: six header integers
//! (read, write and delete durations, file count, max users, max wait)
//! followed by `user file OPERATION time` tuples up to `STOP` or the end of
//! input. File numbers are 1-based in scripts and 0-based everywhere else.

use std::fmt::Write as _;
use std::str::FromStr;

use tracing::warn;

use crate::config::SimulationConfig;
use crate::request::{MAX_SCHEDULED_AT, Operation, Request, UnknownOperation};

/// Token that ends the request list.
pub const STOP_TOKEN: &str = "STOP";

/// Errors that make a script unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Script header is missing {field}")]
    MissingHeader { field: &'static str },

    #[error("Line {line}: invalid {field} '{token}'")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        token: String,
    },

    #[error("Line {line}: request is missing its {field}")]
    TruncatedRequest { line: usize, field: &'static str },
}

/// Why a single request tuple was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    #[error("invalid user ID '{0}'")]
    InvalidUser(String),

    #[error("invalid file ID {0}")]
    InvalidFile(i64),

    #[error("time {0} is past the last schedulable second {max}", max = MAX_SCHEDULED_AT)]
    TimeOutOfRange(u64),

    #[error(transparent)]
    UnknownOperation(#[from] UnknownOperation),
}

/// Request tuple skipped during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Line on which the tuple starts, 1-based
    pub line: usize,
    pub reason: RejectionReason,
}

/// Parsed request script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub config: SimulationConfig,
    /// Accepted requests in script order
    pub requests: Vec<Request>,
    pub rejections: Vec<Rejection>,
}

impl Script {
    /// Creates a script with no rejections.
    pub fn new(config: SimulationConfig, requests: Vec<Request>) -> Self {
        Self {
            config,
            requests,
            rejections: Vec::new(),
        }
    }

    /// Renders the script back into its text format.
    pub fn render(&self) -> String {
        let config = &self.config;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} {}",
            config.read_duration, config.write_duration, config.delete_duration
        );
        let _ = writeln!(
            out,
            "{} {} {}",
            config.file_count, config.max_users, config.max_wait
        );
        for request in &self.requests {
            let _ = writeln!(
                out,
                "{} {} {} {}",
                request.user_id,
                request.file_number(),
                request.operation,
                request.scheduled_at
            );
        }
        out.push_str(STOP_TOKEN);
        out.push('\n');
        out
    }
}

/// Whitespace token iterator that remembers line numbers.
struct Tokens<'a> {
    inner: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
    last_line: usize,
}

impl<'a> Tokens<'a> {
    fn new(input: &'a str) -> Self {
        let inner = input
            .lines()
            .enumerate()
            .flat_map(|(index, line)| line.split_whitespace().map(move |token| (index + 1, token)));
        Self {
            inner: Box::new(inner),
            last_line: 1,
        }
    }

    fn advance(&mut self) -> Option<(usize, &'a str)> {
        let item = self.inner.next();
        if let Some((line, _)) = item {
            self.last_line = line;
        }
        item
    }

    fn header<T: FromStr>(&mut self, field: &'static str) -> Result<T, ParseError> {
        let (line, token) = self.advance().ok_or(ParseError::MissingHeader { field })?;
        parse_number(line, field, token)
    }

    fn field(&mut self, field: &'static str) -> Result<(usize, &'a str), ParseError> {
        self.advance().ok_or(ParseError::TruncatedRequest {
            line: self.last_line,
            field,
        })
    }
}

fn parse_number<T: FromStr>(line: usize, field: &'static str, token: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::InvalidNumber {
        line,
        field,
        token: token.to_string(),
    })
}

/// Parses a request script.
///
/// Tuples with an invalid user ID, file ID or operation, or scheduled after
/// [`MAX_SCHEDULED_AT`], are skipped and recorded as rejections; the rest of
/// the script is still read.
///
/// # Errors
///
/// - `ParseError::MissingHeader` - Input ends inside the six header values
/// - `ParseError::InvalidNumber` - A header value, file ID or time is not a number
/// - `ParseError::TruncatedRequest` - Input ends inside a request tuple
pub fn parse_script(input: &str) -> Result<Script, ParseError> {
    let mut tokens = Tokens::new(input);

    let read_duration = tokens.header("read time")?;
    let write_duration = tokens.header("write time")?;
    let delete_duration = tokens.header("delete time")?;
    let file_count = tokens.header("file count")?;
    let max_users = tokens.header("max users")?;
    let max_wait = tokens.header("max wait time")?;
    let config = SimulationConfig::from_header(
        read_duration,
        write_duration,
        delete_duration,
        file_count,
        max_users,
        max_wait,
    );

    let mut requests = Vec::new();
    let mut rejections = Vec::new();

    while let Some((line, user_token)) = tokens.advance() {
        if user_token == STOP_TOKEN {
            break;
        }

        let (file_line, file_token) = tokens.field("file ID")?;
        let file_id: i64 = parse_number(file_line, "file ID", file_token)?;
        let (_, operation_token) = tokens.field("operation")?;
        let (time_line, time_token) = tokens.field("time")?;
        let scheduled_at: u64 = parse_number(time_line, "time", time_token)?;

        let parsed = parse_user(user_token).and_then(|user_id| {
            let operation = operation_token.parse::<Operation>()?;
            let file_index = file_id
                .checked_sub(1)
                .and_then(|index| usize::try_from(index).ok())
                .ok_or(RejectionReason::InvalidFile(file_id))?;
            if scheduled_at > MAX_SCHEDULED_AT {
                return Err(RejectionReason::TimeOutOfRange(scheduled_at));
            }
            Ok(Request::new(user_id, file_index, operation, scheduled_at))
        });

        match parsed {
            Ok(request) => requests.push(request),
            Err(reason) => {
                warn!(line, %reason, "Skipping request");
                rejections.push(Rejection { line, reason });
            }
        }
    }

    Ok(Script {
        config,
        requests,
        rejections,
    })
}

fn parse_user(token: &str) -> Result<u32, RejectionReason> {
    match token.parse::<u32>() {
        Ok(user_id) if user_id > 0 => Ok(user_id),
        _ => Err(RejectionReason::InvalidUser(token.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
2 3 4
5 2 6
1 1 READ 0
2 1 WRITE 0
3 2 DELETE 4
STOP
";

    #[test]
    fn test_parse_sample() {
        let script = parse_script(SAMPLE).unwrap();

        assert_eq!(script.config, SimulationConfig::from_header(2, 3, 4, 5, 2, 6));
        assert_eq!(
            script.requests,
            vec![
                Request::new(1, 0, Operation::Read, 0),
                Request::new(2, 0, Operation::Write, 0),
                Request::new(3, 1, Operation::Delete, 4),
            ]
        );
        assert!(script.rejections.is_empty());
    }

    #[test]
    fn test_render_reproduces_script() {
        let script = parse_script(SAMPLE).unwrap();
        assert_eq!(script.render(), SAMPLE);
        assert_eq!(parse_script(&script.render()).unwrap(), script);
    }

    #[test]
    fn test_stop_is_optional_and_ends_input() {
        let script = parse_script("1 1 1 1 1 5\n1 1 READ 0").unwrap();
        assert_eq!(script.requests.len(), 1);

        let script = parse_script("1 1 1 1 1 5\n1 1 READ 0\nSTOP\n2 1 READ 0").unwrap();
        assert_eq!(script.requests.len(), 1);
    }

    #[test]
    fn test_bad_tuples_are_skipped() {
        let input = "\
1 1 1 3 1 5
abc 1 READ 0
0 1 READ 0
4 1 RENAME 2
5 0 WRITE 1
6 2 DELETE 3
STOP
";
        let script = parse_script(input).unwrap();

        assert_eq!(script.requests, vec![Request::new(6, 1, Operation::Delete, 3)]);
        let reasons: Vec<(usize, RejectionReason)> = script
            .rejections
            .into_iter()
            .map(|rejection| (rejection.line, rejection.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (2, RejectionReason::InvalidUser("abc".to_string())),
                (3, RejectionReason::InvalidUser("0".to_string())),
                (
                    4,
                    RejectionReason::UnknownOperation(UnknownOperation {
                        token: "RENAME".to_string()
                    })
                ),
                (5, RejectionReason::InvalidFile(0)),
            ]
        );
    }

    #[test]
    fn test_time_past_last_second_is_skipped() {
        let input = format!(
            "1 1 1 1 1 5\n1 1 READ 18446744073709551615\n2 1 READ {MAX_SCHEDULED_AT}\nSTOP\n"
        );
        let script = parse_script(&input).unwrap();

        assert_eq!(
            script.requests,
            vec![Request::new(2, 0, Operation::Read, MAX_SCHEDULED_AT)]
        );
        assert_eq!(
            script.rejections,
            vec![Rejection {
                line: 2,
                reason: RejectionReason::TimeOutOfRange(u64::MAX),
            }]
        );
    }

    #[test]
    fn test_file_beyond_table_is_kept() {
        let script = parse_script("1 1 1 2 1 5\n1 9 READ 0\nSTOP").unwrap();
        assert_eq!(script.requests[0].file_index, 8);
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(
            parse_script("1 2 3 4"),
            Err(ParseError::MissingHeader {
                field: "max users"
            })
        );
        assert_eq!(
            parse_script("1 2 x 4 5 6"),
            Err(ParseError::InvalidNumber {
                line: 1,
                field: "delete time",
                token: "x".to_string(),
            })
        );
        assert!(matches!(
            parse_script("1 2 3\n4 5 -6"),
            Err(ParseError::InvalidNumber { line: 2, .. })
        ));
    }

    #[test]
    fn test_truncated_tuple() {
        assert_eq!(
            parse_script("1 1 1 1 1 5\n1 1 READ"),
            Err(ParseError::TruncatedRequest {
                line: 2,
                field: "time"
            })
        );
    }

    #[test]
    fn test_bad_time_is_fatal() {
        assert!(matches!(
            parse_script("1 1 1 1 1 5\n1 1 READ soon\nSTOP"),
            Err(ParseError::InvalidNumber { field: "time", .. })
        ));
    }
}
