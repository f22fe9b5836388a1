//! Client command vocabulary.

use crate::net::framing::trim_terminator;

/// A client command, matched case-insensitively on the first token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    User,
    Pass,
    List,
    Retr,
    Dele,
    Top,
    Uidl,
    Stat,
    Noop,
    Rset,
    Apop,
    Quit,
    Unknown,
}

impl Command {
    pub fn parse(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "USER" => Command::User,
            "PASS" => Command::Pass,
            "LIST" => Command::List,
            "RETR" => Command::Retr,
            "DELE" => Command::Dele,
            "TOP" => Command::Top,
            "UIDL" => Command::Uidl,
            "STAT" => Command::Stat,
            "NOOP" => Command::Noop,
            "RSET" => Command::Rset,
            "APOP" => Command::Apop,
            "QUIT" => Command::Quit,
            _ => Command::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::User => "USER",
            Command::Pass => "PASS",
            Command::List => "LIST",
            Command::Retr => "RETR",
            Command::Dele => "DELE",
            Command::Top => "TOP",
            Command::Uidl => "UIDL",
            Command::Stat => "STAT",
            Command::Noop => "NOOP",
            Command::Rset => "RSET",
            Command::Apop => "APOP",
            Command::Quit => "QUIT",
            Command::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One client line split into command and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub args: Vec<String>,
}

impl Request {
    pub fn parse(line: &[u8]) -> Self {
        let text = String::from_utf8_lossy(trim_terminator(line));
        let mut tokens = text.split_whitespace();
        let command = tokens.next().map(Command::parse).unwrap_or(Command::Unknown);
        Self {
            command,
            args: tokens.map(str::to_string).collect(),
        }
    }

    /// The single argument, parsed as a message number.
    pub fn message_number(&self) -> Option<u32> {
        match self.args.as_slice() {
            [n] => n.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Command::parse("user"), Command::User);
        assert_eq!(Command::parse("ReTr"), Command::Retr);
        assert_eq!(Command::parse("CAPA"), Command::Unknown);
    }

    #[test]
    fn splits_arguments() {
        let request = Request::parse(b"TOP 3  10\r\n");
        assert_eq!(request.command, Command::Top);
        assert_eq!(request.args, vec!["3", "10"]);

        let bare = Request::parse(b"stat\n");
        assert_eq!(bare.command, Command::Stat);
        assert!(bare.args.is_empty());
    }

    #[test]
    fn empty_line_is_unknown() {
        assert_eq!(Request::parse(b"\r\n").command, Command::Unknown);
    }

    #[test]
    fn message_number_requires_one_numeric_argument() {
        assert_eq!(Request::parse(b"DELE 4\r\n").message_number(), Some(4));
        assert_eq!(Request::parse(b"DELE four\r\n").message_number(), None);
        assert_eq!(Request::parse(b"DELE 4 5\r\n").message_number(), None);
    }
}
