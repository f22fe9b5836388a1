//! Admin command vocabulary.

use crate::net::framing::trim_terminator;

/// A well-formed admin command. Malformed input parses to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Auth(String),
    ListUsers,
    SetServer { user: String, host: String, port: u16 },
    RetrStats,
    ToggleLeet,
    ToggleRotation,
    Finalize,
    Quit,
}

impl AdminCommand {
    pub fn parse(line: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(trim_terminator(line));
        let mut tokens = text.split_whitespace();
        let name = tokens.next()?.to_ascii_uppercase();
        let args: Vec<&str> = tokens.collect();

        let command = match (name.as_str(), args.as_slice()) {
            ("AUTH", [password]) => AdminCommand::Auth((*password).to_string()),
            ("LISTUSERS", []) => AdminCommand::ListUsers,
            ("SETSERVER", [user, host, port]) => AdminCommand::SetServer {
                user: (*user).to_string(),
                host: (*host).to_string(),
                port: port.parse().ok()?,
            },
            ("RETRSTATS", []) => AdminCommand::RetrStats,
            ("TOGGLELEET", []) => AdminCommand::ToggleLeet,
            ("TOGGLEROTATION", []) => AdminCommand::ToggleRotation,
            ("FINALIZE", []) => AdminCommand::Finalize,
            ("QUIT", _) => AdminCommand::Quit,
            _ => return None,
        };
        Some(command)
    }

    /// Whether the command is accepted before `AUTH` succeeds.
    pub fn allowed_before_auth(&self) -> bool {
        matches!(self, AdminCommand::Auth(_) | AdminCommand::Quit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(AdminCommand::parse(b"auth protos\r\n"), Some(AdminCommand::Auth("protos".into())));
        assert_eq!(AdminCommand::parse(b"LISTUSERS\r\n"), Some(AdminCommand::ListUsers));
        assert_eq!(
            AdminCommand::parse(b"SETSERVER bob mail.bob.com 995\r\n"),
            Some(AdminCommand::SetServer {
                user: "bob".into(),
                host: "mail.bob.com".into(),
                port: 995
            })
        );
        assert_eq!(AdminCommand::parse(b"quit\n"), Some(AdminCommand::Quit));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(AdminCommand::parse(b"SETSERVER bob host 99999\r\n"), None);
        assert_eq!(AdminCommand::parse(b"SETSERVER bob host -1\r\n"), None);
        assert_eq!(AdminCommand::parse(b"SETSERVER bob host\r\n"), None);
        assert_eq!(AdminCommand::parse(b"AUTH\r\n"), None);
        assert_eq!(AdminCommand::parse(b"LISTUSERS now\r\n"), None);
        assert_eq!(AdminCommand::parse(b"RESTART\r\n"), None);
        assert_eq!(AdminCommand::parse(b"\r\n"), None);
    }
}
