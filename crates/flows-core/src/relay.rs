//! Per-role message delivery.

use std::collections::HashMap;

use flows_adapters::ChatMessage;

use crate::coordinator::TurnMessage;
use crate::roles::{Role, RoleId};
use crate::session::SessionUpdate;
use crate::stream::StreamSink;

/// Keeps each role's view of the conversation and mirrors every delivery to
/// the progress stream.
///
/// Every contribution reaches every member; the coordinator's directed
/// deliveries land on top of that. Ordering holds within one role's log only.
pub struct MessageRelay {
    members: Vec<RoleId>,
    logs: HashMap<RoleId, Vec<TurnMessage>>,
    sink: StreamSink<SessionUpdate>,
}

impl MessageRelay {
    pub fn new(sink: StreamSink<SessionUpdate>, members: impl IntoIterator<Item = RoleId>) -> Self {
        Self {
            members: members.into_iter().collect(),
            logs: HashMap::new(),
            sink,
        }
    }

    /// Append `message` to the log of `to`, unless that log already ends with
    /// the same content.
    pub fn deliver(&mut self, to: &RoleId, message: TurnMessage, forwarded: bool) {
        self.sink.publish(SessionUpdate::Relayed {
            from: message.author.clone(),
            to: to.clone(),
            content: message.content.clone(),
            forwarded,
        });
        let log = self.logs.entry(to.clone()).or_default();
        if log.last().map(|last| &last.content) != Some(&message.content) {
            log.push(message);
        }
    }

    /// Put a message in every member's log without a progress update.
    pub fn announce(&mut self, message: &TurnMessage) {
        for role in &self.members {
            self.logs
                .entry(role.clone())
                .or_default()
                .push(message.clone());
        }
    }

    /// A role spoke: everyone hears it, the author included.
    pub fn publish(&mut self, message: TurnMessage) {
        self.sink.publish(SessionUpdate::Spoke {
            role: message.author.clone(),
            content: message.content.clone(),
        });
        if !self.members.contains(&message.author) {
            self.logs
                .entry(message.author.clone())
                .or_default()
                .push(message.clone());
        }
        self.announce(&message);
    }

    pub fn log_of(&self, role: &RoleId) -> &[TurnMessage] {
        self.logs.get(role).map(Vec::as_slice).unwrap_or_default()
    }

    /// The generation context for `role`: its instructions, then its log with
    /// its own turns as `assistant` and everyone else's as named `user` turns.
    pub fn history_for(&self, role: &Role) -> Vec<ChatMessage> {
        let mut history = Vec::with_capacity(self.log_of(&role.id).len() + 1);
        if !role.instructions.is_empty() {
            history.push(ChatMessage::system(role.instructions.as_str()));
        }
        history.extend(self.log_of(&role.id).iter().map(|m| {
            if m.author == role.id {
                ChatMessage::assistant(m.content.as_str())
            } else {
                ChatMessage::user(m.content.as_str()).with_name(m.author.as_str())
            }
        }));
        history
    }
}
