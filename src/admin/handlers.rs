//! Admin session state machine and command handlers.

use crate::admin::auth::password_matches;
use crate::admin::command::AdminCommand;
use crate::context::ProxyContext;
use crate::pipeline::Feature;
use crate::routing::Upstream;

pub const GREETING: &str = "+OK POP3 proxy admin ready\r\n";
const UNKNOWN_COMMAND: &str = "-ERR Unknown command\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminState {
    PreAuth,
    Authenticated,
}

/// Reply to one admin line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminReply {
    pub text: String,
    /// Close the connection after sending `text`.
    pub close: bool,
}

impl AdminReply {
    fn line(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            close: false,
        }
    }
}

#[derive(Debug)]
pub struct AdminSession {
    state: AdminState,
    last_command: Option<AdminCommand>,
}

impl Default for AdminSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AdminSession {
    pub fn new() -> Self {
        Self {
            state: AdminState::PreAuth,
            last_command: None,
        }
    }

    pub fn state(&self) -> AdminState {
        self.state
    }

    pub fn last_command(&self) -> Option<&AdminCommand> {
        self.last_command.as_ref()
    }

    pub fn handle(&mut self, line: &[u8], ctx: &ProxyContext) -> AdminReply {
        let Some(command) = AdminCommand::parse(line) else {
            return AdminReply::line(UNKNOWN_COMMAND);
        };
        if self.state == AdminState::PreAuth && !command.allowed_before_auth() {
            return AdminReply::line(UNKNOWN_COMMAND);
        }

        let reply = match &command {
            AdminCommand::Auth(password) => self.authenticate(password, ctx),
            AdminCommand::ListUsers => list_users(ctx),
            AdminCommand::SetServer { user, host, port } => {
                ctx.registry.set_server(user.clone(), Upstream::new(host.clone(), *port));
                AdminReply::line(format!("+OK Server {}:{} set for {}\r\n", host, port, user))
            }
            AdminCommand::RetrStats => AdminReply::line(ctx.stats.snapshot()),
            AdminCommand::ToggleLeet => toggle(ctx, Feature::Leet, "Leetifier"),
            AdminCommand::ToggleRotation => toggle(ctx, Feature::Rotation, "Image rotation"),
            AdminCommand::Finalize => {
                tracing::info!("FINALIZE received, shutting down");
                ctx.shutdown.trigger();
                AdminReply::line("+OK Shutting down\r\n")
            }
            AdminCommand::Quit => AdminReply {
                text: "+OK\r\n".to_string(),
                close: true,
            },
        };

        self.last_command = Some(command);
        reply
    }

    fn authenticate(&mut self, password: &str, ctx: &ProxyContext) -> AdminReply {
        if self.state == AdminState::PreAuth && password_matches(password, &ctx.admin_password()) {
            self.state = AdminState::Authenticated;
            tracing::info!("Admin authenticated");
            AdminReply::line("+OK Welcome\r\n")
        } else {
            tracing::warn!("Admin authentication rejected");
            AdminReply::line(UNKNOWN_COMMAND)
        }
    }
}

fn list_users(ctx: &ProxyContext) -> AdminReply {
    let users = ctx.registry.users();
    let mut text = format!("+OK {} users\r\n", users.len());
    for user in users {
        // Dot-stuffed so a name cannot end the listing early.
        if user.starts_with('.') {
            text.push('.');
        }
        text.push_str(&user);
        text.push_str("\r\n");
    }
    text.push_str(".\r\n");
    AdminReply::line(text)
}

fn toggle(ctx: &ProxyContext, feature: Feature, label: &str) -> AdminReply {
    let enabled = ctx.flags.toggle(feature);
    tracing::info!(feature = ?feature, enabled, "Transformation toggled");
    let state = if enabled { "enabled" } else { "disabled" };
    AdminReply::line(format!("+OK {} {}\r\n", label, state))
}
