//! Client-side state machine.
//!
//! Validates each client line against the session state, resolves and opens
//! the upstream on `USER`, and rewrites `DELE` into a retrieve-then-delete.

use crate::net::framing::crlf;
use crate::observability::Statistics;
use crate::proxy::command::{Command, Request};
use crate::proxy::dialog::{Dialog, Effect, SessionState, INVALID_COMMAND, LOCAL_QUIT};
use crate::routing::ServerRegistry;

impl Dialog {
    /// Handle one complete client line.
    pub fn on_client_line(&mut self, line: &[u8], registry: &ServerRegistry, stats: &Statistics) -> Vec<Effect> {
        stats.record_request();
        let request = Request::parse(line);

        if !self.accepts(&request) {
            return self.reject(line);
        }
        self.last_command = request.command;

        match request.command {
            Command::User => {
                let upstream = registry.resolve(&request.args[0]);
                tracing::debug!(user = %request.args[0], upstream = %upstream, "Resolved upstream");
                self.state = SessionState::AuthPass;
                self.greeting_pending = true;
                self.forward(vec![Effect::Connect(upstream), Effect::ToServer(line.to_vec())])
            }
            Command::List | Command::Uidl => {
                self.multi = request.args.is_empty();
                self.forward(vec![Effect::ToServer(line.to_vec())])
            }
            Command::Dele => {
                let n = request.message_number();
                self.pending_delete = n;
                let retr = crlf(&format!("RETR {}", n.unwrap_or_default()));
                self.forward(vec![Effect::ToServer(retr)])
            }
            Command::Quit if self.state == SessionState::AuthUser => {
                vec![Effect::ToClient(LOCAL_QUIT.to_vec()), Effect::Close]
            }
            _ => self.forward(vec![Effect::ToServer(line.to_vec())]),
        }
    }

    fn accepts(&self, request: &Request) -> bool {
        let transaction = self.state == SessionState::Transaction;
        let argc = request.args.len();
        match request.command {
            Command::User => self.state == SessionState::AuthUser && argc == 1,
            Command::Pass => self.state == SessionState::AuthPass && self.last_command == Command::User && argc == 1,
            Command::List | Command::Uidl => transaction && argc <= 1,
            Command::Retr => transaction && argc == 1,
            Command::Dele => transaction && request.message_number().is_some(),
            Command::Top => transaction && argc == 2,
            Command::Apop | Command::Stat | Command::Noop | Command::Rset => transaction,
            Command::Quit => argc == 0,
            Command::Unknown => false,
        }
    }

    fn reject(&mut self, line: &[u8]) -> Vec<Effect> {
        match self.state {
            SessionState::AuthUser | SessionState::AuthPass => vec![Effect::ToClient(INVALID_COMMAND.to_vec())],
            SessionState::Transaction | SessionState::Update => {
                self.last_command = Command::Unknown;
                self.multi = false;
                self.forward(vec![Effect::ToServer(line.to_vec())])
            }
        }
    }

    fn forward(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        self.outstanding = true;
        self.at_status = true;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Upstream;

    fn registry() -> ServerRegistry {
        let registry = ServerRegistry::new(Upstream::new("default.example", 110));
        registry.set_server("bob", Upstream::new("mail.bob.com", 995));
        registry
    }

    fn authenticated() -> Dialog {
        let mut dialog = Dialog::new();
        dialog.state = SessionState::Transaction;
        dialog
    }

    #[test]
    fn user_routes_to_default_for_unknown_name() {
        let (registry, stats) = (registry(), Statistics::new());
        let mut dialog = Dialog::new();

        let effects = dialog.on_client_line(b"USER alice\r\n", &registry, &stats);

        assert_eq!(
            effects,
            vec![
                Effect::Connect(Upstream::new("default.example", 110)),
                Effect::ToServer(b"USER alice\r\n".to_vec()),
            ]
        );
        assert_eq!(dialog.state(), SessionState::AuthPass);
        assert!(dialog.is_waiting());
        assert_eq!(stats.requests(), 1);
    }

    #[test]
    fn user_routes_to_registered_server() {
        let (registry, stats) = (registry(), Statistics::new());
        let mut dialog = Dialog::new();
        let effects = dialog.on_client_line(b"user bob\r\n", &registry, &stats);
        assert_eq!(effects[0], Effect::Connect(Upstream::new("mail.bob.com", 995)));
    }

    #[test]
    fn pre_auth_commands_never_reach_upstream() {
        let (registry, stats) = (registry(), Statistics::new());
        for line in [
            &b"STAT\r\n"[..],
            b"NOOP\r\n",
            b"RETR 1\r\n",
            b"DELE 1\r\n",
            b"LIST\r\n",
            b"PASS secret\r\n",
            b"USER\r\n",
            b"USER a b\r\n",
            b"CAPA\r\n",
            b"QUIT now\r\n",
        ] {
            let mut dialog = Dialog::new();
            let effects = dialog.on_client_line(line, &registry, &stats);
            assert_eq!(effects, vec![Effect::ToClient(INVALID_COMMAND.to_vec())], "{:?}", line);
            assert_eq!(dialog.state(), SessionState::AuthUser);
        }
        assert_eq!(stats.requests(), 10);
    }

    #[test]
    fn pass_requires_preceding_user() {
        let (registry, stats) = (registry(), Statistics::new());
        let mut dialog = Dialog::new();
        dialog.on_client_line(b"USER alice\r\n", &registry, &stats);

        let effects = dialog.on_client_line(b"PASS secret\r\n", &registry, &stats);
        assert_eq!(effects, vec![Effect::ToServer(b"PASS secret\r\n".to_vec())]);
        assert_eq!(dialog.state(), SessionState::AuthPass);

        let again = dialog.on_client_line(b"PASS secret\r\n", &registry, &stats);
        assert_eq!(again, vec![Effect::ToClient(INVALID_COMMAND.to_vec())]);
    }

    #[test]
    fn quit_before_user_is_answered_locally() {
        let (registry, stats) = (registry(), Statistics::new());
        let mut dialog = Dialog::new();
        let effects = dialog.on_client_line(b"QUIT\r\n", &registry, &stats);
        assert_eq!(effects, vec![Effect::ToClient(b"+OK\r\n".to_vec()), Effect::Close]);
    }

    #[test]
    fn quit_after_user_is_forwarded() {
        let (registry, stats) = (registry(), Statistics::new());
        let mut dialog = Dialog::new();
        dialog.on_client_line(b"USER alice\r\n", &registry, &stats);
        let effects = dialog.on_client_line(b"QUIT\r\n", &registry, &stats);
        assert_eq!(effects, vec![Effect::ToServer(b"QUIT\r\n".to_vec())]);
        assert_eq!(dialog.last_command(), Command::Quit);
    }

    #[test]
    fn dele_becomes_retr_for_same_number() {
        let (registry, stats) = (registry(), Statistics::new());
        let mut dialog = authenticated();
        let effects = dialog.on_client_line(b"DELE 7\r\n", &registry, &stats);
        assert_eq!(effects, vec![Effect::ToServer(b"RETR 7\r\n".to_vec())]);
        assert_eq!(dialog.pending_delete(), Some(7));
        assert_eq!(dialog.last_command(), Command::Dele);
    }

    #[test]
    fn list_without_argument_is_multi() {
        let (registry, stats) = (registry(), Statistics::new());
        let mut dialog = authenticated();
        dialog.on_client_line(b"LIST\r\n", &registry, &stats);
        assert!(dialog.is_multi());

        let mut single = authenticated();
        single.on_client_line(b"UIDL 2\r\n", &registry, &stats);
        assert!(!single.is_multi());
    }

    #[test]
    fn post_auth_rejections_pass_through_as_unknown() {
        let (registry, stats) = (registry(), Statistics::new());
        for line in [&b"TOP 1\r\n"[..], b"DELE x\r\n", b"RETR\r\n", b"LIST 1 2\r\n", b"CAPA\r\n", b"USER bob\r\n"] {
            let mut dialog = authenticated();
            let effects = dialog.on_client_line(line, &registry, &stats);
            assert_eq!(effects, vec![Effect::ToServer(line.to_vec())]);
            assert_eq!(dialog.last_command(), Command::Unknown);
            assert_eq!(dialog.pending_delete(), None);
        }
    }

    #[test]
    fn apop_accepts_any_arguments_in_transaction() {
        let (registry, stats) = (registry(), Statistics::new());
        let mut dialog = authenticated();
        let effects = dialog.on_client_line(b"APOP mrose c4c9334bac560ecc979e58001b3e22fb\r\n", &registry, &stats);
        assert_eq!(dialog.last_command(), Command::Apop);
        assert_eq!(effects.len(), 1);
    }
}
