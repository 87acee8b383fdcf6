use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flows_adapters::fakes::{FnGeneration, ScriptedGeneration};
use flows_adapters::{ChatMessage, ChatRole, GenerationAdapter};
use flows_core::{
    FlowError, GroupChatSession, RoleId, RoleRegistry, SessionConfig, SessionUpdate,
};
use futures::StreamExt;

struct Roster {
    source: Arc<ScriptedGeneration>,
    email: Arc<ScriptedGeneration>,
    facebook: Arc<ScriptedGeneration>,
    twitter: Arc<ScriptedGeneration>,
    editor: Arc<ScriptedGeneration>,
}

impl Roster {
    fn session(&self, config: SessionConfig) -> GroupChatSession {
        GroupChatSession::new(RoleRegistry::marketing(), config)
            .with_agent("ProductInformationProvider", self.source.clone())
            .with_agent("EmailWriter", self.email.clone())
            .with_agent("FacebookPostWriter", self.facebook.clone())
            .with_agent("TwitterPostWriter", self.twitter.clone())
            .with_agent("Editor", self.editor.clone())
    }
}

fn roster_with_one_revision() -> Roster {
    Roster {
        source: Arc::new(ScriptedGeneration::new([
            "Wireless earbuds with noise cancellation, 30h battery",
        ])),
        email: Arc::new(ScriptedGeneration::new(["email v1", "email v2"])),
        facebook: Arc::new(ScriptedGeneration::new(["facebook post"])),
        twitter: Arc::new(ScriptedGeneration::new(["tweet"])),
        editor: Arc::new(ScriptedGeneration::new([
            "Please shorten this.",
            "APPROVE",
            "APPROVE",
            "APPROVE",
        ])),
    }
}

#[tokio::test]
async fn marketing_session_runs_to_completion() {
    let roster = roster_with_one_revision();
    let mut handle = roster.session(SessionConfig::default()).spawn("Wireless earbuds");

    let updates: Vec<SessionUpdate> = handle.stream().collect().await;
    let outcome = handle.finish().await.unwrap();

    assert_eq!(outcome.turns, 9);
    let approved: Vec<&str> = outcome.approved.iter().map(RoleId::as_str).collect();
    assert_eq!(
        approved,
        vec!["EmailWriter", "FacebookPostWriter", "TwitterPostWriter"]
    );
    assert_eq!(
        outcome.product_info.as_deref(),
        Some("Wireless earbuds with noise cancellation, 30h battery")
    );
    let drafts: Vec<&str> = outcome.final_drafts().into_iter().map(|(_, d)| d).collect();
    assert_eq!(drafts, vec!["email v2", "facebook post", "tweet"]);

    let approvals = updates
        .iter()
        .filter(|u| matches!(u, SessionUpdate::Approved { .. }))
        .count();
    assert_eq!(approvals, 3);
    let spoke = updates
        .iter()
        .filter(|u| matches!(u, SessionUpdate::Spoke { .. }))
        .count();
    assert_eq!(spoke, 9);
    assert!(matches!(
        updates.last(),
        Some(SessionUpdate::Approved { producer }) if producer.as_str() == "TwitterPostWriter"
    ));
}

#[tokio::test]
async fn revision_request_reaches_the_producer_with_its_draft() {
    let roster = roster_with_one_revision();
    let (sink, _stream) = flows_core::stream::channel();
    roster
        .session(SessionConfig::default())
        .run("Wireless earbuds", &sink)
        .await
        .unwrap();

    let calls = roster.email.calls();
    assert_eq!(calls.len(), 2);
    let second = &calls[1];
    let last = second.last().unwrap();
    assert_eq!(last.role, ChatRole::User);
    assert_eq!(last.content, "Please shorten this.");
    assert_eq!(last.name.as_deref(), Some("Editor"));
    assert!(second
        .iter()
        .any(|m| m.role == ChatRole::Assistant && m.content == "email v1"));

    let editor_first = &roster.editor.calls()[0];
    let draft = editor_first.last().unwrap();
    assert_eq!(draft.content, "email v1");
    assert_eq!(draft.name.as_deref(), Some("EmailWriter"));
}

#[tokio::test]
async fn later_producers_hear_the_whole_conversation() {
    let roster = roster_with_one_revision();
    let (sink, _stream) = flows_core::stream::channel();
    roster
        .session(SessionConfig::default())
        .run("Wireless earbuds", &sink)
        .await
        .unwrap();

    let facebook_first = &roster.facebook.calls()[0];
    let heard: Vec<(Option<&str>, &str)> = facebook_first
        .iter()
        .filter(|m| m.role == ChatRole::User)
        .map(|m| (m.name.as_deref(), m.content.as_str()))
        .collect();
    assert_eq!(
        heard,
        vec![
            (Some("MarketingManager"), "Wireless earbuds"),
            (
                Some("ProductInformationProvider"),
                "Wireless earbuds with noise cancellation, 30h battery"
            ),
            (Some("EmailWriter"), "email v1"),
            (Some("Editor"), "Please shorten this."),
            (Some("EmailWriter"), "email v2"),
            (Some("Editor"), "APPROVE"),
        ]
    );

    let editor_last = roster.editor.calls().pop().unwrap();
    assert_eq!(editor_last.last().unwrap().content, "tweet");
    assert!(editor_last
        .iter()
        .any(|m| m.role == ChatRole::User && m.content == "facebook post"));
    assert_eq!(
        editor_last
            .iter()
            .filter(|m| m.role == ChatRole::Assistant && m.content == "APPROVE")
            .count(),
        2
    );
}

#[tokio::test]
async fn source_is_asked_with_the_request() {
    let roster = roster_with_one_revision();
    let (sink, _stream) = flows_core::stream::channel();
    roster
        .session(SessionConfig::default())
        .run("Wireless earbuds", &sink)
        .await
        .unwrap();

    let first = &roster.source.calls()[0];
    assert_eq!(first[0].role, ChatRole::System);
    let request = first.last().unwrap();
    assert_eq!(request.content, "Wireless earbuds");
    assert_eq!(request.name.as_deref(), Some("MarketingManager"));
}

#[tokio::test]
async fn endless_feedback_exhausts_the_turn_budget() {
    let adapter = Arc::new(FnGeneration::new(|_: &[ChatMessage]| {
        Ok("rewrite please".to_string())
    }));
    let config = SessionConfig {
        max_turns: 5,
        ..SessionConfig::default()
    };
    let session = GroupChatSession::marketing(adapter.clone(), config);

    let err = session.spawn("earbuds").finish().await.unwrap_err();
    assert!(matches!(err, FlowError::TurnBudgetExhausted { max_turns: 5 }));
    assert_eq!(adapter.call_count(), 5);
}

struct SlowGeneration;

#[async_trait]
impl GenerationAdapter for SlowGeneration {
    fn provider(&self) -> &str {
        "slow"
    }

    async fn generate(&self, _messages: &[ChatMessage]) -> flows_adapters::Result<String> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok("too late".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn slow_generation_hits_the_session_timeout() {
    let config = SessionConfig {
        timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    };
    let session = GroupChatSession::marketing(Arc::new(SlowGeneration), config);

    let err = session.spawn("earbuds").finish().await.unwrap_err();
    assert!(matches!(err, FlowError::Timeout { limit_ms: 2000 }));
}

#[tokio::test]
async fn generation_failure_ends_the_stream_with_an_error() {
    let mut roster = roster_with_one_revision();
    roster.twitter = Arc::new(ScriptedGeneration::new(Vec::<String>::new()));

    let mut handle = roster.session(SessionConfig::default()).spawn("earbuds");
    let updates: Vec<SessionUpdate> = handle.stream().collect().await;
    let err = handle.finish().await.unwrap_err();

    assert!(matches!(err, FlowError::Adapter(_)));
    let approvals = updates
        .iter()
        .filter(|u| matches!(u, SessionUpdate::Approved { .. }))
        .count();
    assert_eq!(approvals, 2);
}
