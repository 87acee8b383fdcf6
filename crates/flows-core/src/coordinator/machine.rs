//! The turn coordinator state machine.
//!
//! The coordinator never calls a model. It consumes [`TurnMessage`]s and
//! answers with [`Directive`]s; the session runner executes them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::approval::ApprovalPolicy;
use crate::coordinator::error::CoordinatorError;
use crate::coordinator::log::{SessionLog, TurnMessage};
use crate::roles::{RoleId, RoleKind, RoleRegistry};

/// Where the session is in the draft/review cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "producer", rename_all = "snake_case")]
pub enum CoordinatorState {
    AwaitingSourceInfo,
    /// Transient: passed through while product information fans out.
    BroadcastingToProducers,
    AwaitingProducerDraft(usize),
    AwaitingReview(usize),
    Revising(usize),
    Done,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorState::AwaitingSourceInfo => write!(f, "awaiting_source_info"),
            CoordinatorState::BroadcastingToProducers => write!(f, "broadcasting_to_producers"),
            CoordinatorState::AwaitingProducerDraft(i) => write!(f, "awaiting_producer_draft({i})"),
            CoordinatorState::AwaitingReview(i) => write!(f, "awaiting_review({i})"),
            CoordinatorState::Revising(i) => write!(f, "revising({i})"),
            CoordinatorState::Done => write!(f, "done"),
        }
    }
}

/// An instruction for the session runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    /// Append to the recipient's own log only.
    Deliver { to: RoleId, message: TurnMessage },
    /// Append to the recipient's log; already recorded in the session log.
    Forward { to: RoleId, message: TurnMessage },
    /// Ask this role for its next contribution.
    RequestToSpeak(RoleId),
    /// Every producer is approved.
    Complete,
}

/// Per-session coordinator. Owns the session state exclusively.
#[derive(Debug, Clone)]
pub struct TurnCoordinator {
    registry: RoleRegistry,
    policy: ApprovalPolicy,
    state: CoordinatorState,
    started: bool,
    current: usize,
    approved: BTreeSet<usize>,
    product_info: Option<String>,
    log: SessionLog,
}

impl TurnCoordinator {
    pub fn new(registry: RoleRegistry) -> Self {
        Self::with_policy(registry, ApprovalPolicy::default())
    }

    pub fn with_policy(registry: RoleRegistry, policy: ApprovalPolicy) -> Self {
        Self {
            registry,
            policy,
            state: CoordinatorState::AwaitingSourceInfo,
            started: false,
            current: 0,
            approved: BTreeSet::new(),
            product_info: None,
            log: SessionLog::new(),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    /// Index of the producer whose draft is pending or under review.
    pub fn current_producer(&self) -> usize {
        self.current
    }

    /// Approved producer indices, ascending.
    pub fn approved(&self) -> Vec<usize> {
        self.approved.iter().copied().collect()
    }

    pub fn product_info(&self) -> Option<&str> {
        self.product_info.as_deref()
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn is_done(&self) -> bool {
        self.state == CoordinatorState::Done
    }

    /// Hand the user's request to the source role and ask it to speak.
    pub fn start(&mut self, request: &str) -> Result<Vec<Directive>, CoordinatorError> {
        if self.started || self.state != CoordinatorState::AwaitingSourceInfo {
            return Err(CoordinatorError::AlreadyStarted);
        }
        self.started = true;

        let source = self.registry.source().id.clone();
        let message = TurnMessage {
            author: self.registry.coordinator().id.clone(),
            content: request.to_string(),
        };
        Ok(vec![
            Directive::Deliver {
                to: source.clone(),
                message,
            },
            Directive::RequestToSpeak(source),
        ])
    }

    /// Who should speak now. Empty once the session is done.
    pub fn request_turn(&self) -> Vec<Directive> {
        let role = match self.state {
            CoordinatorState::Done => return Vec::new(),
            CoordinatorState::AwaitingSourceInfo => self.registry.source(),
            CoordinatorState::AwaitingReview(_) => self.registry.reviewer(),
            CoordinatorState::BroadcastingToProducers
            | CoordinatorState::AwaitingProducerDraft(_)
            | CoordinatorState::Revising(_) => self.producer(self.current),
        };
        vec![Directive::RequestToSpeak(role.id.clone())]
    }

    /// Route one contribution.
    ///
    /// Validates the author against the current state before touching
    /// anything, so an error leaves the coordinator exactly as it was.
    pub fn on_message(&mut self, message: TurnMessage) -> Result<Vec<Directive>, CoordinatorError> {
        if self.state == CoordinatorState::Done {
            debug!(author = %message.author, "session done, ignoring message");
            return Ok(Vec::new());
        }

        let kind = self
            .registry
            .kind_of(&message.author)
            .ok_or_else(|| CoordinatorError::UnknownRole(message.author.0.clone()))?;

        match (self.state, kind) {
            (CoordinatorState::AwaitingSourceInfo, RoleKind::Source) => {
                Ok(self.accept_source(message))
            }
            (
                CoordinatorState::AwaitingProducerDraft(i) | CoordinatorState::Revising(i),
                RoleKind::Producer(p),
            ) if p == i => Ok(self.accept_draft(i, message)),
            (CoordinatorState::AwaitingReview(i), RoleKind::Reviewer) => {
                Ok(self.accept_review(i, message))
            }
            (state, _) => Err(CoordinatorError::UnexpectedSpeaker {
                state: state.to_string(),
                expected: self.expected_speaker().to_string(),
                actual: message.author.0,
            }),
        }
    }

    fn accept_source(&mut self, message: TurnMessage) -> Vec<Directive> {
        self.state = CoordinatorState::BroadcastingToProducers;
        self.product_info = Some(message.content.clone());
        self.log.append(message.clone(), None);

        let broadcast = TurnMessage {
            author: self.registry.coordinator().id.clone(),
            content: message.content,
        };
        let mut directives: Vec<Directive> = self
            .registry
            .producers()
            .iter()
            .map(|p| Directive::Deliver {
                to: p.id.clone(),
                message: broadcast.clone(),
            })
            .collect();

        self.current = 0;
        directives.push(Directive::RequestToSpeak(self.producer(0).id.clone()));
        self.state = CoordinatorState::AwaitingProducerDraft(0);
        directives
    }

    fn accept_draft(&mut self, index: usize, message: TurnMessage) -> Vec<Directive> {
        let reviewer = self.registry.reviewer().id.clone();
        self.log.append(message.clone(), None);
        self.log.append(message.clone(), Some(reviewer.clone()));
        self.state = CoordinatorState::AwaitingReview(index);

        vec![
            Directive::Forward {
                to: reviewer.clone(),
                message,
            },
            Directive::RequestToSpeak(reviewer),
        ]
    }

    fn accept_review(&mut self, index: usize, message: TurnMessage) -> Vec<Directive> {
        let approved = self.policy.is_approval(&message.content);
        self.log.append(message.clone(), None);

        if approved {
            self.approved.insert(index);
            match self.next_unapproved(index) {
                None => {
                    self.state = CoordinatorState::Done;
                    vec![Directive::Complete]
                }
                Some(next) => {
                    self.current = next;
                    self.state = CoordinatorState::AwaitingProducerDraft(next);
                    vec![Directive::RequestToSpeak(self.producer(next).id.clone())]
                }
            }
        } else {
            let producer = self.producer(index).id.clone();
            self.log.append(message.clone(), Some(producer.clone()));
            self.state = CoordinatorState::Revising(index);
            vec![
                Directive::Forward {
                    to: producer.clone(),
                    message,
                },
                Directive::RequestToSpeak(producer),
            ]
        }
    }

    /// First unapproved producer after `from`, wrapping around.
    fn next_unapproved(&self, from: usize) -> Option<usize> {
        let n = self.registry.producer_count();
        (1..=n)
            .map(|step| (from + step) % n)
            .find(|i| !self.approved.contains(i))
    }

    fn expected_speaker(&self) -> &RoleId {
        match self.state {
            CoordinatorState::AwaitingSourceInfo => &self.registry.source().id,
            CoordinatorState::AwaitingReview(_) => &self.registry.reviewer().id,
            CoordinatorState::Done => &self.registry.coordinator().id,
            CoordinatorState::BroadcastingToProducers
            | CoordinatorState::AwaitingProducerDraft(_)
            | CoordinatorState::Revising(_) => &self.producer(self.current).id,
        }
    }

    /// `current` is kept in `0..producer_count()` and the registry never has
    /// zero producers.
    fn producer(&self, index: usize) -> &crate::roles::Role {
        &self.registry.producers()[index]
    }
}
