//! Role vocabulary and the fixed, ordered participant roster.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::roles::error::{RoleError, RoleResult};

/// Stable identifier of a participant, e.g. `"EmailWriter"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        RoleId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleId {
    fn from(s: &str) -> Self {
        RoleId(s.to_string())
    }
}

impl From<String> for RoleId {
    fn from(s: String) -> Self {
        RoleId(s)
    }
}

/// What a role does in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ordinal", rename_all = "snake_case")]
pub enum RoleKind {
    /// Supplies the information every producer works from.
    Source,
    /// Drafts content; the ordinal fixes its turn order.
    Producer(usize),
    /// Approves or sends feedback on drafts.
    Reviewer,
    /// Routes turns; never generates.
    Coordinator,
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleKind::Source => write!(f, "source"),
            RoleKind::Producer(i) => write!(f, "producer[{i}]"),
            RoleKind::Reviewer => write!(f, "reviewer"),
            RoleKind::Coordinator => write!(f, "coordinator"),
        }
    }
}

/// A named participant with fixed system instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub kind: RoleKind,
    pub instructions: String,
}

impl Role {
    pub fn new(id: impl Into<String>, kind: RoleKind, instructions: impl Into<String>) -> Self {
        Self {
            id: RoleId(id.into()),
            kind,
            instructions: instructions.into(),
        }
    }
}

/// The validated roster: one source, N >= 1 producers in ordinal order, one
/// reviewer, one coordinator. Immutable once built.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    source: Role,
    producers: Vec<Role>,
    reviewer: Role,
    coordinator: Role,
}

impl RoleRegistry {
    /// Validate and index a list of roles.
    ///
    /// Producers may be given in any order; they are sorted by ordinal and
    /// the ordinals must then read `0, 1, .., n-1`.
    pub fn new(roles: Vec<Role>) -> RoleResult<Self> {
        let mut seen = HashSet::new();
        for role in &roles {
            if role.id.0.trim().is_empty() {
                return Err(RoleError::EmptyId);
            }
            if !seen.insert(role.id.clone()) {
                return Err(RoleError::DuplicateRole {
                    id: role.id.0.clone(),
                });
            }
        }

        let mut sources = Vec::new();
        let mut producers = Vec::new();
        let mut reviewers = Vec::new();
        let mut coordinators = Vec::new();
        for role in roles {
            match role.kind {
                RoleKind::Source => sources.push(role),
                RoleKind::Producer(_) => producers.push(role),
                RoleKind::Reviewer => reviewers.push(role),
                RoleKind::Coordinator => coordinators.push(role),
            }
        }

        let source = exactly_one(sources, "source")?;
        let reviewer = exactly_one(reviewers, "reviewer")?;
        let coordinator = exactly_one(coordinators, "coordinator")?;

        if producers.is_empty() {
            return Err(RoleError::NoProducers);
        }
        producers.sort_by_key(|r| ordinal(r.kind));
        let ordinals: Vec<usize> = producers.iter().map(|r| ordinal(r.kind)).collect();
        if ordinals.iter().enumerate().any(|(i, o)| i != *o) {
            return Err(RoleError::BadOrdinals {
                expected: producers.len(),
                found: ordinals,
            });
        }

        Ok(Self {
            source,
            producers,
            reviewer,
            coordinator,
        })
    }

    /// The marketing campaign roster: product information provider, email /
    /// Facebook / Twitter writers, an editor and a marketing manager.
    pub fn marketing() -> Self {
        Self {
            source: Role::new(
                "ProductInformationProvider",
                RoleKind::Source,
                "Based on given product name, provide a brief description of the product and its key features.",
            ),
            producers: vec![
                Role::new(
                    "EmailWriter",
                    RoleKind::Producer(0),
                    "You are a marketing email writer. Write a compelling email promoting our new product.",
                ),
                Role::new(
                    "FacebookPostWriter",
                    RoleKind::Producer(1),
                    "You are a social media manager. Write an engaging Facebook post promoting our new product.",
                ),
                Role::new(
                    "TwitterPostWriter",
                    RoleKind::Producer(2),
                    "You are a social media manager. Write a captivating Twitter post promoting our new product, within 280 characters.",
                ),
            ],
            reviewer: Role::new(
                "Editor",
                RoleKind::Reviewer,
                "You are an editor. Review the draft and reply with 'APPROVE' if it's good, or provide suggestions for improvement. Consider the below guidelines when reviewing:\n\n1. Is the content engaging and informative?\n2. Is the tone appropriate for the target audience?\n3. Are there any grammatical errors or typos?",
            ),
            coordinator: Role::new("MarketingManager", RoleKind::Coordinator, ""),
        }
    }

    pub fn source(&self) -> &Role {
        &self.source
    }

    pub fn producers(&self) -> &[Role] {
        &self.producers
    }

    pub fn producer(&self, index: usize) -> Option<&Role> {
        self.producers.get(index)
    }

    pub fn reviewer(&self) -> &Role {
        &self.reviewer
    }

    pub fn coordinator(&self) -> &Role {
        &self.coordinator
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Look a role up by id.
    pub fn get(&self, id: &RoleId) -> Option<&Role> {
        self.iter().find(|r| &r.id == id)
    }

    /// Kind of the role with this id, if registered.
    pub fn kind_of(&self, id: &RoleId) -> Option<RoleKind> {
        self.get(id).map(|r| r.kind)
    }

    /// All roles: source, producers in order, reviewer, coordinator.
    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        std::iter::once(&self.source)
            .chain(self.producers.iter())
            .chain(std::iter::once(&self.reviewer))
            .chain(std::iter::once(&self.coordinator))
    }
}

fn ordinal(kind: RoleKind) -> usize {
    match kind {
        RoleKind::Producer(i) => i,
        _ => usize::MAX,
    }
}

fn exactly_one(mut roles: Vec<Role>, kind: &'static str) -> RoleResult<Role> {
    match roles.len() {
        1 => Ok(roles.remove(0)),
        found => Err(RoleError::WrongCount { kind, found }),
    }
}
