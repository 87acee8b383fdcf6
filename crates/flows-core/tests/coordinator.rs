use flows_core::{
    ApprovalPolicy, CoordinatorError, CoordinatorState, Directive, Role, RoleId, RoleKind,
    RoleRegistry, TurnCoordinator, TurnMessage,
};

fn registry(producers: &[&str]) -> RoleRegistry {
    let mut roles = vec![
        Role::new("ProductInfo", RoleKind::Source, "describe the product"),
        Role::new("Editor", RoleKind::Reviewer, "reply APPROVE or give feedback"),
        Role::new("Manager", RoleKind::Coordinator, ""),
    ];
    for (i, id) in producers.iter().enumerate() {
        roles.push(Role::new(*id, RoleKind::Producer(i), "write"));
    }
    RoleRegistry::new(roles).unwrap()
}

/// The single role a directive batch asks to speak.
fn speaker(directives: &[Directive]) -> Option<RoleId> {
    directives.iter().find_map(|d| match d {
        Directive::RequestToSpeak(role) => Some(role.clone()),
        _ => None,
    })
}

const EARBUDS: &str = "Wireless earbuds with noise cancellation";

/// Run a session where the reviewer always approves. Returns the producers in
/// the order they were asked to draft.
fn run_always_approving(producers: &[&str]) -> (TurnCoordinator, Vec<RoleId>) {
    let mut c = TurnCoordinator::new(registry(producers));
    c.start("Wireless earbuds").unwrap();
    let info = TurnMessage::new("ProductInfo", EARBUDS);
    let mut next = speaker(&c.on_message(info).unwrap());
    let mut drafted = Vec::new();

    while let Some(role) = next {
        let reply = if role.as_str() == "Editor" {
            "APPROVE".to_string()
        } else {
            drafted.push(role.clone());
            format!("draft by {role}")
        };
        let directives = c.on_message(TurnMessage::new(role, reply)).unwrap();
        if directives.contains(&Directive::Complete) {
            break;
        }
        next = speaker(&directives);
    }
    (c, drafted)
}

#[test]
fn always_approving_finishes_after_one_round_trip_per_producer() {
    for n in 1..=4 {
        let names: Vec<String> = (0..n).map(|i| format!("Writer{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (c, drafted) = run_always_approving(&refs);

        assert_eq!(c.state(), CoordinatorState::Done);
        let expected: Vec<RoleId> = refs.iter().map(|s| RoleId::from(*s)).collect();
        assert_eq!(drafted, expected, "producers drafted in order for n={n}");
        assert_eq!(c.approved(), (0..n).collect::<Vec<_>>());
    }
}

#[test]
fn earbuds_session_log_has_seven_entries() {
    let (c, _) = run_always_approving(&["Email", "Social"]);
    let log = c.log();

    assert_eq!(log.len(), 7);
    assert_eq!(c.approved().len(), 2);
    assert_eq!(c.product_info(), Some(EARBUDS));
    assert_eq!(log.entries()[0].message.content, EARBUDS);
    assert_eq!(log.by_author(&"ProductInfo".into()).count(), 1);
    assert_eq!(log.by_author(&"Editor".into()).count(), 2);
    let producer_entries = log
        .entries()
        .iter()
        .filter(|e| matches!(e.message.author.as_str(), "Email" | "Social"))
        .count();
    assert_eq!(producer_entries, 4);

    let forwarded: Vec<_> = log
        .entries()
        .iter()
        .filter_map(|e| e.forwarded_to.as_ref().map(RoleId::as_str))
        .collect();
    assert_eq!(forwarded, vec!["Editor", "Editor"]);

    let seqs: Vec<u64> = log.entries().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=7).collect::<Vec<_>>());
}

#[test]
fn feedback_returns_to_the_same_producer() {
    let mut c = TurnCoordinator::new(registry(&["Email", "Social"]));
    c.start("Wireless earbuds").unwrap();
    c.on_message(TurnMessage::new("ProductInfo", "facts")).unwrap();
    c.on_message(TurnMessage::new("Email", "long draft")).unwrap();

    let directives = c
        .on_message(TurnMessage::new("Editor", "Please shorten this."))
        .unwrap();
    assert_eq!(
        directives,
        vec![
            Directive::Forward {
                to: "Email".into(),
                message: TurnMessage::new("Editor", "Please shorten this."),
            },
            Directive::RequestToSpeak("Email".into()),
        ]
    );
    assert_eq!(c.state(), CoordinatorState::Revising(0));
    assert_eq!(c.current_producer(), 0);
    assert!(c.approved().is_empty());

    c.on_message(TurnMessage::new("Email", "short draft")).unwrap();
    assert_eq!(c.state(), CoordinatorState::AwaitingReview(0));
    assert_eq!(c.current_producer(), 0);

    let directives = c.on_message(TurnMessage::new("Editor", "APPROVE")).unwrap();
    assert_eq!(directives, vec![Directive::RequestToSpeak("Social".into())]);
    assert_eq!(c.current_producer(), 1);
}

#[test]
fn approved_set_only_grows() {
    let mut c = TurnCoordinator::new(registry(&["Email", "Social"]));
    c.start("x").unwrap();
    c.on_message(TurnMessage::new("ProductInfo", "facts")).unwrap();

    let script = [
        ("Email", "v1"),
        ("Editor", "needs work"),
        ("Email", "v2"),
        ("Editor", "APPROVE"),
        ("Social", "post"),
        ("Editor", "more emoji"),
        ("Social", "post 2"),
        ("Editor", "APPROVE"),
    ];
    let mut previous = 0;
    for (author, content) in script {
        c.on_message(TurnMessage::new(author, content)).unwrap();
        let approved = c.approved();
        assert!(approved.len() >= previous);
        let mut unique = approved.clone();
        unique.dedup();
        assert_eq!(unique, approved);
        previous = approved.len();
    }
    assert!(c.is_done());
    assert_eq!(c.approved(), vec![0, 1]);
}

#[test]
fn negated_approval_counts_under_default_policy() {
    assert!(ApprovalPolicy::default().is_approval("I would NOT APPROVE this"));
    assert!(!ApprovalPolicy::StrictToken.is_approval("I would NOT APPROVE this"));

    let mut c = TurnCoordinator::new(registry(&["Email"]));
    c.start("x").unwrap();
    c.on_message(TurnMessage::new("ProductInfo", "facts")).unwrap();
    c.on_message(TurnMessage::new("Email", "draft")).unwrap();
    let directives = c
        .on_message(TurnMessage::new("Editor", "I would NOT APPROVE this"))
        .unwrap();
    assert_eq!(directives, vec![Directive::Complete]);
}

#[test]
fn idle_after_done() {
    let (mut c, _) = run_always_approving(&["Email"]);
    let log_len = c.log().len();

    assert!(c.request_turn().is_empty());
    let directives = c.on_message(TurnMessage::new("Email", "late draft")).unwrap();
    assert!(directives.is_empty());
    assert_eq!(c.log().len(), log_len);
    assert_eq!(c.state(), CoordinatorState::Done);
}

#[test]
fn routing_errors_leave_state_untouched() {
    let mut c = TurnCoordinator::new(registry(&["Email"]));
    c.start("x").unwrap();

    let err = c.on_message(TurnMessage::new("Stranger", "hi")).unwrap_err();
    assert_eq!(err, CoordinatorError::UnknownRole("Stranger".into()));

    let err = c.on_message(TurnMessage::new("Editor", "APPROVE")).unwrap_err();
    assert!(matches!(err, CoordinatorError::UnexpectedSpeaker { .. }));

    assert_eq!(c.state(), CoordinatorState::AwaitingSourceInfo);
    assert!(c.log().is_empty());
    assert!(c.product_info().is_none());
}

#[test]
fn source_information_reaches_every_producer() {
    let mut c = TurnCoordinator::new(registry(&["Email", "Social", "Tweet"]));
    c.start("x").unwrap();
    let directives = c.on_message(TurnMessage::new("ProductInfo", "facts")).unwrap();

    let delivered: Vec<&str> = directives
        .iter()
        .filter_map(|d| match d {
            Directive::Deliver { to, message } => {
                assert_eq!(message.author.as_str(), "Manager");
                assert_eq!(message.content, "facts");
                Some(to.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(delivered, vec!["Email", "Social", "Tweet"]);
    assert_eq!(c.log().len(), 1);
}
