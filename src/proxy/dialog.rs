//! Per-session protocol record.
//!
//! A [`Dialog`] holds everything the two state machines share: the session
//! state, the last accepted client command and the markers that decide how
//! upstream lines are interpreted. It performs no I/O. Each input line yields
//! a list of [`Effect`]s which the session task executes in order.

use crate::proxy::command::Command;
use crate::routing::Upstream;

/// Protocol state of a proxied session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for `USER`.
    AuthUser,
    /// Upstream connected, waiting for `PASS`.
    AuthPass,
    Transaction,
    /// `QUIT` acknowledged; the session is closing.
    Update,
}

/// Action requested by a state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the upstream connection.
    Connect(Upstream),
    /// Queue bytes for the upstream server.
    ToServer(Vec<u8>),
    /// Queue bytes for the client.
    ToClient(Vec<u8>),
    /// Append a line to the session's capture.
    Capture(Vec<u8>),
    /// Seal the capture and hand it to the transformation pipeline.
    Transform,
    /// Seal the capture, parse it and throw it away.
    DiscardCapture,
    /// Drop the upstream connection.
    Disconnect,
    /// Close the session once the client has received everything queued.
    Close,
}

pub(crate) const INVALID_COMMAND: &[u8] = b"-ERR invalid command\r\n";
pub(crate) const UNREACHABLE: &[u8] = b"-ERR Unable to reach mail server\r\n";
pub(crate) const LOCAL_QUIT: &[u8] = b"+OK\r\n";

#[derive(Debug)]
pub struct Dialog {
    pub(super) state: SessionState,
    pub(super) last_command: Command,
    /// An argument-less LIST or UIDL is outstanding.
    pub(super) multi: bool,
    /// Message number of a DELE being carried out as RETR then DELE.
    pub(super) pending_delete: Option<u32>,
    /// The next upstream line is the server greeting.
    pub(super) greeting_pending: bool,
    /// The next upstream line starts a reply.
    pub(super) at_status: bool,
    /// A forwarded command has not been fully answered yet.
    pub(super) outstanding: bool,
}

impl Default for Dialog {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialog {
    pub fn new() -> Self {
        Self {
            state: SessionState::AuthUser,
            last_command: Command::Unknown,
            multi: false,
            pending_delete: None,
            greeting_pending: false,
            at_status: true,
            outstanding: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_command(&self) -> Command {
        self.last_command
    }

    pub fn pending_delete(&self) -> Option<u32> {
        self.pending_delete
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    /// True while a forwarded command waits for (the rest of) its reply.
    /// Further client lines are held back until it is answered, so replies
    /// pair with requests in order.
    ///
    /// Only the commands in [`Command`] are known to have multi-line
    /// replies. A passed-through command outside that set (`CAPA`, say) is
    /// considered answered by its first line; the remaining lines are still
    /// forwarded, but a command pipelined behind it may be sent before they
    /// arrive.
    pub fn is_waiting(&self) -> bool {
        self.outstanding
    }

    /// The upstream connection could not be established.
    pub fn on_connect_failed(&mut self) -> Vec<Effect> {
        self.reset_auth();
        vec![Effect::ToClient(UNREACHABLE.to_vec())]
    }

    /// Upstream dropped; forget everything tied to it.
    pub(super) fn reset_auth(&mut self) {
        self.state = SessionState::AuthUser;
        self.last_command = Command::Unknown;
        self.multi = false;
        self.pending_delete = None;
        self.greeting_pending = false;
        self.at_status = true;
        self.outstanding = false;
    }

    /// A single-line reply was received. The last command is kept: PASS
    /// still needs to see the USER before it.
    pub(super) fn reply_complete(&mut self) {
        self.at_status = true;
        self.outstanding = false;
    }

    /// A multi-line exchange reached its end.
    pub(super) fn exchange_complete(&mut self) {
        self.reply_complete();
        self.last_command = Command::Unknown;
        self.multi = false;
    }
}
