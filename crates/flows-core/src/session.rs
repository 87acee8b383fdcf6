//! Group-chat session runner.
//!
//! Executes the coordinator's directives one at a time: deliveries go through
//! the relay, speak requests become generation calls, and every reply is fed
//! back into the coordinator. One generation call is in flight at a time.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flows_adapters::GenerationAdapter;
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::coordinator::{
    ApprovalPolicy, CoordinatorState, Directive, LogEntry, TurnCoordinator, TurnMessage,
};
use crate::domain::{FlowError, Result};
use crate::metrics::METRICS;
use crate::obs::{
    emit_review_verdict, emit_session_finished, emit_session_started, emit_turn_relayed,
    session_span,
};
use crate::relay::MessageRelay;
use crate::roles::{RoleId, RoleKind, RoleRegistry};
use crate::stream::{spawn_flow, FlowHandle, StreamSink};

pub const DEFAULT_MAX_TURNS: usize = 40;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Progress items published while a session runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// A role produced a contribution.
    Spoke { role: RoleId, content: String },
    /// A message landed in another role's log.
    Relayed {
        from: RoleId,
        to: RoleId,
        content: String,
        forwarded: bool,
    },
    /// The reviewer approved this producer's draft.
    Approved { producer: RoleId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Speak requests allowed before the session gives up
    pub max_turns: usize,
    pub timeout: Duration,
    pub policy: ApprovalPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            policy: ApprovalPolicy::default(),
        }
    }
}

/// Result of a session that reached `Done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: String,
    /// The session log
    pub messages: Vec<LogEntry>,
    /// Approved producers in producer order
    pub approved: Vec<RoleId>,
    /// Speak requests served
    pub turns: usize,
    pub product_info: Option<String>,
}

impl SessionOutcome {
    /// Latest draft of each approved producer.
    pub fn final_drafts(&self) -> Vec<(&RoleId, &str)> {
        self.approved
            .iter()
            .filter_map(|producer| {
                self.messages
                    .iter()
                    .rev()
                    .find(|e| &e.message.author == producer && e.forwarded_to.is_none())
                    .map(|e| (producer, e.message.content.as_str()))
            })
            .collect()
    }
}

/// One review-gated group chat over a fixed roster.
pub struct GroupChatSession {
    id: String,
    registry: RoleRegistry,
    agents: HashMap<RoleId, Arc<dyn GenerationAdapter>>,
    config: SessionConfig,
}

impl GroupChatSession {
    pub fn new(registry: RoleRegistry, config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            registry,
            agents: HashMap::new(),
            config,
        }
    }

    /// The marketing roster with every speaking role on one adapter.
    pub fn marketing(adapter: Arc<dyn GenerationAdapter>, config: SessionConfig) -> Self {
        Self::new(RoleRegistry::marketing(), config).with_shared_adapter(adapter)
    }

    /// Bind the generation adapter for one role.
    pub fn with_agent(mut self, role: impl Into<RoleId>, adapter: Arc<dyn GenerationAdapter>) -> Self {
        self.agents.insert(role.into(), adapter);
        self
    }

    /// Bind `adapter` to every role that speaks.
    pub fn with_shared_adapter(mut self, adapter: Arc<dyn GenerationAdapter>) -> Self {
        let speakers: Vec<RoleId> = self
            .registry
            .iter()
            .filter(|r| r.kind != RoleKind::Coordinator)
            .map(|r| r.id.clone())
            .collect();
        for id in speakers {
            self.agents.insert(id, Arc::clone(&adapter));
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    /// Run in a spawned task, streaming [`SessionUpdate`]s.
    pub fn spawn(self, request: impl Into<String>) -> FlowHandle<SessionUpdate, SessionOutcome> {
        let request = request.into();
        spawn_flow(move |sink| async move { self.run(&request, &sink).await })
    }

    /// Run to completion, bounded by the turn budget and the timeout.
    pub async fn run(
        &self,
        request: &str,
        sink: &StreamSink<SessionUpdate>,
    ) -> Result<SessionOutcome> {
        self.check_agents()?;

        let started = Instant::now();
        emit_session_started(&self.id, "group_chat", self.registry.iter().count());
        METRICS.inc_sessions();

        let limit = self.config.timeout;
        let result = tokio::time::timeout(limit, self.drive(request, sink))
            .instrument(session_span("group_chat", &self.id))
            .await
            .unwrap_or(Err(FlowError::Timeout {
                limit_ms: limit.as_millis() as u64,
            }));

        let turns = result.as_ref().map_or(0, |o| o.turns as u64);
        emit_session_finished(
            &self.id,
            started.elapsed().as_millis() as u64,
            turns,
            result.is_ok(),
        );
        METRICS.flush();
        result
    }

    fn check_agents(&self) -> Result<()> {
        self.registry
            .iter()
            .filter(|r| r.kind != RoleKind::Coordinator)
            .find(|r| !self.agents.contains_key(&r.id))
            .map_or(Ok(()), |r| Err(FlowError::MissingAgent(r.id.0.clone())))
    }

    async fn drive(
        &self,
        request: &str,
        sink: &StreamSink<SessionUpdate>,
    ) -> Result<SessionOutcome> {
        let mut coordinator = TurnCoordinator::with_policy(self.registry.clone(), self.config.policy);
        let members = self
            .registry
            .iter()
            .filter(|r| r.kind != RoleKind::Coordinator)
            .map(|r| r.id.clone());
        let mut relay = MessageRelay::new(sink.clone(), members);
        let mut queue: VecDeque<Directive> = coordinator.start(request)?.into();
        relay.announce(&TurnMessage::new(self.registry.coordinator().id.clone(), request));
        let mut turns = 0usize;

        while let Some(directive) = queue.pop_front() {
            match directive {
                Directive::Deliver { to, message } => relay.deliver(&to, message, false),
                Directive::Forward { to, message } => relay.deliver(&to, message, true),
                Directive::RequestToSpeak(role) => {
                    if turns >= self.config.max_turns {
                        return Err(FlowError::TurnBudgetExhausted {
                            max_turns: self.config.max_turns,
                        });
                    }
                    turns += 1;
                    METRICS.inc_turns();

                    let content = self.speak(&relay, &role).await?;
                    let message = TurnMessage::new(role, content);
                    relay.publish(message.clone());

                    let reviewing = match coordinator.state() {
                        CoordinatorState::AwaitingReview(i) => Some(i),
                        _ => None,
                    };
                    let approved_before = coordinator.approved().len();
                    let logged_before = coordinator.log().len();

                    queue.extend(coordinator.on_message(message)?);

                    for entry in &coordinator.log().entries()[logged_before..] {
                        emit_turn_relayed(
                            &self.id,
                            entry.seq,
                            entry.message.author.as_str(),
                            entry.forwarded_to.as_ref().map(RoleId::as_str),
                        );
                    }
                    if let Some(index) = reviewing {
                        self.report_verdict(
                            sink,
                            index,
                            coordinator.approved().len() > approved_before,
                        );
                    }
                }
                Directive::Complete => {
                    debug!(turns, "all drafts approved");
                    return Ok(self.outcome(coordinator, turns));
                }
            }
        }

        Err(FlowError::Stalled {
            state: coordinator.state().to_string(),
        })
    }

    async fn speak(&self, relay: &MessageRelay, role_id: &RoleId) -> Result<String> {
        let role = self
            .registry
            .get(role_id)
            .ok_or_else(|| FlowError::MissingAgent(role_id.0.clone()))?;
        let agent = self
            .agents
            .get(role_id)
            .ok_or_else(|| FlowError::MissingAgent(role_id.0.clone()))?;

        let history = relay.history_for(role);
        debug!(role = %role_id, context = history.len(), provider = agent.provider(), "requesting turn");
        METRICS.inc_generations();
        Ok(agent.generate(&history).await?)
    }

    fn report_verdict(&self, sink: &StreamSink<SessionUpdate>, index: usize, approved: bool) {
        let Some(producer) = self.registry.producer(index) else {
            return;
        };
        emit_review_verdict(&self.id, producer.id.as_str(), approved);
        if approved {
            METRICS.inc_approvals();
            sink.publish(SessionUpdate::Approved {
                producer: producer.id.clone(),
            });
        } else {
            METRICS.inc_revisions();
        }
    }

    fn outcome(&self, coordinator: TurnCoordinator, turns: usize) -> SessionOutcome {
        let approved = coordinator
            .approved()
            .into_iter()
            .filter_map(|i| self.registry.producer(i).map(|r| r.id.clone()))
            .collect();
        let product_info = coordinator.product_info().map(str::to_string);
        SessionOutcome {
            session_id: self.id.clone(),
            messages: coordinator.log().entries().to_vec(),
            approved,
            turns,
            product_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flows_adapters::fakes::ScriptedGeneration;

    #[tokio::test]
    async fn missing_agent_is_reported_before_running() {
        let session = GroupChatSession::new(RoleRegistry::marketing(), SessionConfig::default())
            .with_agent("EmailWriter", Arc::new(ScriptedGeneration::new(["x"])));
        let (sink, _stream) = crate::stream::channel();
        let err = session.run("earbuds", &sink).await.unwrap_err();
        assert!(matches!(err, FlowError::MissingAgent(ref id) if id == "ProductInformationProvider"));
    }

    #[test]
    fn final_drafts_pick_latest_contribution() {
        let entry = |seq, author: &str, content: &str, fwd: Option<&str>| LogEntry {
            seq,
            message: TurnMessage::new(author, content),
            forwarded_to: fwd.map(RoleId::from),
        };
        let outcome = SessionOutcome {
            session_id: "s".into(),
            messages: vec![
                entry(1, "Email", "v1", None),
                entry(2, "Email", "v1", Some("Editor")),
                entry(3, "Email", "v2", None),
                entry(4, "Email", "v2", Some("Editor")),
            ],
            approved: vec!["Email".into()],
            turns: 4,
            product_info: None,
        };
        assert_eq!(outcome.final_drafts(), vec![(&RoleId::from("Email"), "v2")]);
    }
}
