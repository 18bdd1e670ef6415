//! Commands and their client-side validation.
//!
//! This module defines the [`Command`] sent to a graph processor and the
//! [`Validator`] that checks it before a single byte reaches the transport.
//!
//! The peer protocol understands shell-like operators (`&&`, `!&&`, `|`) and,
//! when enabled, redirection to and from files on the peer's side (`>`, `<`).
//! Arguments are therefore restricted to plain word tokens unless the command
//! is on a short, explicit allow-list of commands that take free-form values.
//!
//! # Overview
//! A command is either:
//!
//! - `Call`: a command name plus integer/text arguments, joined with spaces.
//! - `Line`: a complete command line, used for operator and redirection syntax.
//!
//! # Example
//! ```rust
//! use gpclient::{Command, Validator};
//!
//! let validator = Validator::default();
//!
//! let cmd = Command::new("traverse-successors").arg(1).arg(3);
//! let prepared = validator.prepare(&cmd, false, false).unwrap();
//! assert_eq!(prepared.line, "traverse-successors 1 3");
//!
//! let bad = Command::new("traverse-successors").arg("1 > /etc/passwd");
//! assert!(validator.prepare(&bad, false, false).is_err());
//! ```
use std::fmt;

use crate::{ClientError, ClientResult, Field};

/// Commands whose arguments are validated leniently. Their values (credentials,
/// meta variable contents) routinely contain punctuation.
pub const LENIENT_COMMANDS: [&str; 2] = ["set-meta", "authorize"];

/// Command sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A command name with its arguments.
    Call { name: String, args: Vec<Field> },
    /// A raw command line.
    Line(String),
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Command::Call {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn line(line: impl Into<String>) -> Self {
        Command::Line(line.into())
    }

    /// Appends an argument. Has no effect on a raw line.
    pub fn arg(mut self, arg: impl Into<Field>) -> Self {
        if let Command::Call { args, .. } = &mut self {
            args.push(arg.into());
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            Command::Call { name, .. } => name,
            Command::Line(line) => {
                let line = line.trim_start();
                let end = line
                    .find(|c: char| !is_word(c) && c != '-')
                    .unwrap_or(line.len());
                &line[..end]
            }
        }
    }
}

impl From<&str> for Command {
    fn from(value: &str) -> Self {
        Command::Line(value.to_string())
    }
}

impl From<String> for Command {
    fn from(value: String) -> Self {
        Command::Line(value)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Call { name, args } => {
                write!(f, "{name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            Command::Line(line) => write!(f, "{line}"),
        }
    }
}

/// Command line ready to be written to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    /// Command line without line break.
    pub line: String,
    /// A data block follows the command line.
    pub expects_input: bool,
}

/// Syntax and security rules for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    /// Accept `<` and `>` redirection to files on the peer's side.
    pub allow_pipes: bool,
    /// Restrict arguments to word tokens.
    pub strict_arguments: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            allow_pipes: false,
            strict_arguments: true,
        }
    }
}

impl Validator {
    /// Validates `command` and renders its command line.
    ///
    /// `has_source` and `has_sink` tell whether the caller binds a local data
    /// source or sink to this invocation.
    pub fn prepare(
        &self,
        command: &Command,
        has_source: bool,
        has_sink: bool,
    ) -> ClientResult<Prepared> {
        let line = match command {
            Command::Call { name, args } => self.render_call(name, args)?,
            Command::Line(line) => line.clone(),
        };

        let mut line = line.trim().to_string();
        if line.is_empty() {
            return Err(ClientError::usage("command is empty"));
        }

        if !is_valid_command_string(&line) {
            return Err(ClientError::usage(format!("invalid command: {line}")));
        }

        if !self.allow_pipes && line.contains(['<', '>']) {
            return Err(ClientError::usage(format!(
                "command denied, pipes are disallowed by allow_pipes = false; command: {line}"
            )));
        }

        if has_source && line.contains('<') {
            return Err(ClientError::usage(format!(
                "can't use data input file and a local data source at the same time: {line}"
            )));
        }

        if has_sink && line.contains('>') {
            return Err(ClientError::usage(format!(
                "can't use data output file and a local data sink at the same time: {line}"
            )));
        }

        if has_source && !line.ends_with(':') {
            line.push(':');
        }
        let expects_input = line.ends_with(':');

        Ok(Prepared {
            line,
            expects_input,
        })
    }

    fn render_call(&self, name: &str, args: &[Field]) -> ClientResult<String> {
        if name.is_empty() {
            return Err(ClientError::usage("empty command"));
        }
        if !is_valid_command_name(name) {
            return Err(ClientError::usage(format!("invalid command name: {name}")));
        }

        let mut strict = self.strict_arguments && !LENIENT_COMMANDS.contains(&name);
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(name.to_string());

        for arg in args {
            let arg = arg.to_string();
            if self.allow_pipes {
                // Everything after a redirection is a file path.
                if arg == "<" || arg == ">" {
                    strict = false;
                }
                if is_operator(&arg) {
                    parts.push(arg);
                    continue;
                }
            }

            if !is_valid_command_argument(&arg, strict) {
                return Err(ClientError::usage(format!("invalid argument: {arg}")));
            }
            parts.push(arg);
        }

        Ok(parts.join(" "))
    }
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_bad_char(c: char) -> bool {
    c < ' ' || !c.is_ascii()
}

fn is_operator(arg: &str) -> bool {
    !arg.is_empty() && arg.chars().all(|c| matches!(c, '|' | '&' | '!' | ':' | '<' | '>'))
}

/// A letter or underscore followed by word characters or dashes.
pub fn is_valid_command_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| is_word(c) || c == '-'),
        _ => false,
    }
}

/// Checks a full command line: a valid command name, followed by nothing (or a
/// data block marker), by an argument or operator, or by a pipe, redirection or
/// comment character.
pub fn is_valid_command_string(command: &str) -> bool {
    if command.chars().any(is_bad_char) {
        return false;
    }

    let name_len = command
        .find(|c: char| !is_word(c) && c != '-')
        .unwrap_or(command.len());
    if !is_valid_command_name(&command[..name_len]) {
        return false;
    }

    let rest = &command[name_len..];
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        return true;
    }
    if let Some(after) = trimmed.strip_prefix(':') {
        if after.trim().is_empty() {
            return true;
        }
    }

    let op_len = rest
        .find(|c: char| !(c.is_whitespace() || c == '!' || c == '&'))
        .unwrap_or(rest.len());
    if op_len > 0 && rest[op_len..].starts_with(is_word) {
        return true;
    }

    trimmed.starts_with(['|', '<', '>', '#'])
}

/// Strict arguments are word tokens that may contain dashes. Lenient arguments
/// may contain anything but whitespace, control or non-ASCII characters and the
/// operator characters `| < > ! & #`.
pub fn is_valid_command_argument(arg: &str, strict: bool) -> bool {
    if arg.is_empty() {
        return false;
    }

    if strict {
        let mut chars = arg.chars();
        chars.next().is_some_and(is_word) && chars.all(|c| is_word(c) || c == '-')
    } else {
        !arg.chars().any(|c| {
            c.is_whitespace() || is_bad_char(c) || matches!(c, '|' | '<' | '>' | '!' | '&' | '#')
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipes() -> Validator {
        Validator {
            allow_pipes: true,
            ..Validator::default()
        }
    }

    #[test]
    fn command_names() {
        for name in ["x", "xyz", "x7y", "_x", "list-successors", "a_b-c"] {
            assert!(is_valid_command_name(name), "rejected {name}");
        }
        for name in ["", "123", "7x", "-x", "a:b", "a b", "<x>y", "ä"] {
            assert!(!is_valid_command_name(name), "accepted {name}");
        }
    }

    #[test]
    fn command_strings() {
        let accepted = [
            "x",
            " x ",
            "x:",
            "add-arcs :",
            "clear && clear",
            "clear !&& clear",
            "traverse-successors 1 2 &&! traverse-successors 3 2",
            "clear > /tmp/test",
            "clear < /tmp/test",
            "list-roots | head",
        ];
        let validator = pipes();
        for line in accepted {
            assert!(
                validator.prepare(&Command::line(line), false, false).is_ok(),
                "rejected {line:?}"
            );
        }

        let rejected = ["", "   ", "123", "<x>y", "a:b"];
        for line in rejected {
            assert!(
                validator.prepare(&Command::line(line), false, false).is_err(),
                "accepted {line:?}"
            );
        }

        for ch in "\r\n\t\0^\"$%/()[]{}=?'`\\*+~.,;@\u{dd}".chars() {
            let line = format!("a {ch} b");
            assert!(!is_valid_command_string(&line), "accepted {line:?}");
        }
    }

    #[test]
    fn strict_arguments() {
        for arg in ["x", "123", "1337x", "7x7", "x-y", "_"] {
            assert!(is_valid_command_argument(arg, true), "rejected {arg}");
        }
        for arg in ["", " x ", "1337 x", "x:y", "-x", "a,b", "a&b", "ä"] {
            assert!(!is_valid_command_argument(arg, true), "accepted {arg}");
        }
    }

    #[test]
    fn lenient_arguments() {
        for arg in ["fred:test", "a,b", "x=y", "/tmp/out", "(x)"] {
            assert!(is_valid_command_argument(arg, false), "rejected {arg}");
        }
        for arg in ["", "a b", "a|b", "a<b", "a>b", "a!b", "a&b", "a#b", "a\tb", "ä"] {
            assert!(!is_valid_command_argument(arg, false), "accepted {arg}");
        }
    }

    #[test]
    fn call_arguments_are_validated() {
        let validator = Validator::default();

        let cmd = Command::new("foo").arg("1337x");
        assert_eq!(validator.prepare(&cmd, false, false).unwrap().line, "foo 1337x");

        let cmd = Command::new("foo").arg("1337 x");
        assert!(validator.prepare(&cmd, false, false).is_err());

        let cmd = Command::new("7foo");
        assert!(validator.prepare(&cmd, false, false).is_err());

        let cmd = Command::new("");
        assert!(validator.prepare(&cmd, false, false).is_err());
    }

    #[test]
    fn lenient_commands() {
        let validator = Validator::default();

        let cmd = Command::new("authorize").arg("password").arg("fred:test");
        let prepared = validator.prepare(&cmd, false, false).unwrap();
        assert_eq!(prepared.line, "authorize password fred:test");

        let cmd = Command::new("set-meta").arg("comment").arg("a&b");
        assert!(validator.prepare(&cmd, false, false).is_err());

        let cmd = Command::new("use-graph").arg("fred:test");
        assert!(validator.prepare(&cmd, false, false).is_err());
    }

    #[test]
    fn non_strict_validator() {
        let validator = Validator {
            strict_arguments: false,
            ..Validator::default()
        };

        let cmd = Command::new("foo").arg("x:y");
        assert!(validator.prepare(&cmd, false, false).is_ok());
    }

    #[test]
    fn redirection_requires_allow_pipes() {
        let cmd = Command::line("clear > /tmp/out");

        assert!(Validator::default().prepare(&cmd, false, false).is_err());
        assert!(pipes().prepare(&cmd, false, false).is_ok());
        assert!(pipes().prepare(&cmd, false, true).is_err());

        let cmd = Command::line("add-arcs < /tmp/in");
        assert!(pipes().prepare(&cmd, false, false).is_ok());
        assert!(pipes().prepare(&cmd, true, false).is_err());
    }

    #[test]
    fn redirection_tokens_in_calls() {
        let cmd = Command::new("list-roots").arg(">").arg("/tmp/out");

        assert!(Validator::default().prepare(&cmd, false, false).is_err());

        let prepared = pipes().prepare(&cmd, false, false).unwrap();
        assert_eq!(prepared.line, "list-roots > /tmp/out");
    }

    #[test]
    fn source_appends_colon() {
        let validator = Validator::default();

        let prepared = validator.prepare(&Command::new("add-arcs"), true, false).unwrap();
        assert_eq!(prepared.line, "add-arcs:");
        assert!(prepared.expects_input);

        let prepared = validator.prepare(&Command::line("add-arcs:"), true, false).unwrap();
        assert_eq!(prepared.line, "add-arcs:");

        let prepared = validator.prepare(&Command::line("add-arcs:"), false, false).unwrap();
        assert!(prepared.expects_input);

        let prepared = validator.prepare(&Command::new("clear"), false, false).unwrap();
        assert!(!prepared.expects_input);
    }

    #[test]
    fn command_name_of_line() {
        assert_eq!(Command::line(" clear && stats").name(), "clear");
        assert_eq!(Command::new("stats").arg(1).name(), "stats");
        assert_eq!(Command::new("stats").arg(1).arg("x").to_string(), "stats 1 x");
    }
}
