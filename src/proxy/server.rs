//! Server-side state machine.
//!
//! Upstream replies are not self-describing, so each line is interpreted by
//! the last accepted client command.

use crate::net::framing::{crlf, is_negative, is_positive, is_terminator};
use crate::observability::{Statistics, StatusCode};
use crate::proxy::command::Command;
use crate::proxy::dialog::{Dialog, Effect, SessionState};

impl Dialog {
    /// Handle one complete upstream line.
    pub fn on_server_line(&mut self, line: &[u8], stats: &Statistics) -> Vec<Effect> {
        let status = self.at_status;
        if status {
            if is_positive(line) {
                stats.record_response(StatusCode::Ok);
            } else if is_negative(line) {
                stats.record_response(StatusCode::Err);
            }
        }

        if self.greeting_pending {
            self.greeting_pending = false;
            return Vec::new();
        }

        let forward = Effect::ToClient(line.to_vec());
        match self.last_command {
            Command::User => {
                if is_negative(line) {
                    stats.record_auth(StatusCode::Err);
                }
                self.reply_complete();
                vec![forward]
            }
            Command::Pass => {
                self.reply_complete();
                if is_positive(line) {
                    self.state = SessionState::Transaction;
                    stats.record_auth(StatusCode::Ok);
                    vec![forward]
                } else if is_negative(line) {
                    stats.record_auth(StatusCode::Err);
                    self.reset_auth();
                    vec![forward, Effect::Disconnect]
                } else {
                    vec![forward]
                }
            }
            Command::Retr => {
                if status && is_negative(line) {
                    self.exchange_complete();
                    vec![forward]
                } else if !status && is_terminator(line) {
                    self.exchange_complete();
                    vec![Effect::Capture(line.to_vec()), Effect::Transform]
                } else {
                    self.at_status = false;
                    vec![Effect::Capture(line.to_vec())]
                }
            }
            Command::Dele => {
                if status && is_negative(line) {
                    self.pending_delete = None;
                    self.exchange_complete();
                    vec![forward]
                } else if !status && is_terminator(line) {
                    let n = self.pending_delete.take().unwrap_or_default();
                    // The reply to the real DELE goes straight to the client.
                    self.last_command = Command::Unknown;
                    self.at_status = true;
                    vec![
                        Effect::Capture(line.to_vec()),
                        Effect::DiscardCapture,
                        Effect::ToServer(crlf(&format!("DELE {}", n))),
                    ]
                } else {
                    self.at_status = false;
                    vec![Effect::Capture(line.to_vec())]
                }
            }
            Command::List | Command::Uidl if self.multi => self.multi_line(line, status),
            Command::Top => self.multi_line(line, status),
            Command::Quit => {
                self.reply_complete();
                if self.state == SessionState::Transaction {
                    self.state = SessionState::Update;
                }
                vec![forward, Effect::Close]
            }
            // Unknown commands are taken as single-line; see `Dialog::is_waiting`.
            _ => {
                self.reply_complete();
                vec![forward]
            }
        }
    }

    /// LIST, UIDL or TOP reply forwarded line by line up to the terminator.
    fn multi_line(&mut self, line: &[u8], status: bool) -> Vec<Effect> {
        if (status && is_negative(line)) || (!status && is_terminator(line)) {
            self.exchange_complete();
        } else {
            self.at_status = false;
        }
        vec![Effect::ToClient(line.to_vec())]
    }
}
