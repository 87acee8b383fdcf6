//! Turn messages and the append-only session log.

use serde::{Deserialize, Serialize};

use crate::roles::RoleId;

/// One role's contribution, tagged with its author. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub author: RoleId,
    pub content: String,
}

impl TurnMessage {
    pub fn new(author: impl Into<RoleId>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
        }
    }
}

/// A session log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 1-based, strictly increasing within a session
    pub seq: u64,
    pub message: TurnMessage,
    /// Set when this entry records a message forwarded to another role
    pub forwarded_to: Option<RoleId>,
}

/// Append-only, totally ordered record of a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionLog {
    entries: Vec<LogEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, message: TurnMessage, forwarded_to: Option<RoleId>) -> u64 {
        let seq = self.entries.last().map_or(1, |e| e.seq + 1);
        self.entries.push(LogEntry {
            seq,
            message,
            forwarded_to,
        });
        seq
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose message was authored by `role`.
    pub fn by_author<'a>(&'a self, role: &'a RoleId) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries.iter().filter(move |e| &e.message.author == role)
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_starts_at_one_and_increases() {
        let mut log = SessionLog::new();
        assert_eq!(log.append(TurnMessage::new("A", "x"), None), 1);
        assert_eq!(log.append(TurnMessage::new("B", "y"), Some("A".into())), 2);
        let seqs: Vec<u64> = log.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(log.by_author(&"B".into()).count(), 1);
    }
}
