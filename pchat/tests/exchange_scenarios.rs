mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use pchat::prelude::*;
use pchat::{
    CONTENT_POLICY_MESSAGE, ChatErrorKind, SERVICE_FAILURE_MESSAGE, TRANSIENT_MESSAGE,
    is_structurally_valid,
};
use pprovider::{ProviderError, Role, ToolResult};
use serde_json::json;
use support::{
    FailingStore, FakeSubscriptions, Fixture, GatedStrategy, ScriptedStrategy, call,
    calls_response, text_response,
};

fn assistant_finals(log: &[ConversationTurn]) -> usize {
    log.iter()
        .filter(|turn| turn.role == TurnRole::Assistant && !turn.has_tool_calls())
        .count()
}

#[tokio::test]
async fn free_tier_image_request_is_denied_before_any_generation() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Free, 5, 5));
    let strategy = Arc::new(ScriptedStrategy::new(vec![Ok(calls_response(vec![call(
        "call_1",
        "generate_image",
        json!({"prompt": "a cat"}),
    )]))]));
    let orchestrator = fixture.orchestrator(strategy.clone());

    let report = orchestrator
        .run_exchange(InboundMessage::text("u1", "generate an image of a cat"))
        .await
        .expect("exchange runs");

    assert!(matches!(
        report.outcome,
        ExchangeOutcome::DeniedBySubscription { .. }
    ));
    assert!(fixture.generator.calls().is_empty());
    assert!(fixture.transport.sent().is_empty());
    assert_eq!(strategy.requests().len(), 1);

    let log = fixture.log("u1");
    let roles = log.iter().map(|turn| turn.role).collect::<Vec<_>>();
    assert_eq!(
        roles,
        [
            TurnRole::Human,
            TurnRole::Assistant,
            TurnRole::Tool,
            TurnRole::Assistant
        ]
    );
    assert!(log[2].content.contains("\"status\":\"denied\""));
    assert_eq!(log[3].content, report.outcome.user_text());
    assert!(is_structurally_valid(&log));
}

#[tokio::test]
async fn users_without_any_subscription_are_also_upsold() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![Ok(calls_response(vec![call(
        "call_1",
        "generate_image",
        json!({"prompt": "a cat"}),
    )]))]));

    let report = fixture
        .orchestrator(strategy)
        .run_exchange(InboundMessage::text("u1", "draw a cat"))
        .await
        .expect("exchange runs");

    assert!(matches!(
        report.outcome,
        ExchangeOutcome::DeniedBySubscription { .. }
    ));
}

#[tokio::test]
async fn completed_image_generation_charges_exactly_what_was_produced() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Standard, 2, 0));
    let strategy = Arc::new(ScriptedStrategy::new(vec![
        Ok(calls_response(vec![call(
            "call_1",
            "generate_image",
            json!({"prompt": "a cat", "count": 1}),
        )])),
        Ok(text_response("Here is your cat.")),
    ]));
    let orchestrator = fixture.orchestrator(strategy.clone());

    let report = orchestrator
        .run_exchange(InboundMessage::text("u1", "draw one cat"))
        .await
        .expect("exchange runs");

    let ExchangeOutcome::Answered(answer) = &report.outcome else {
        panic!("expected an answer, got {:?}", report.outcome);
    };
    assert_eq!(answer.kind, AnswerKind::Images);
    assert_eq!(answer.text, "Here is your cat.");
    assert_eq!(answer.media.len(), 1);

    assert_eq!(fixture.subscriptions.decrements(), [(QuotaKind::Image, 1)]);
    assert_eq!(
        fixture
            .subscriptions
            .state()
            .map(|state| state.remaining_image_generations),
        Some(1)
    );
    assert_eq!(fixture.transport.sent(), ["Drawing your image...".to_string()]);
    assert_eq!(fixture.transport.deleted(), 1);

    let requests = strategy.requests();
    let follow_up = &requests[1];
    let tool_messages = follow_up
        .messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .collect::<Vec<_>>();
    assert_eq!(tool_messages.len(), 1);
    let payload: serde_json::Value =
        serde_json::from_str(&tool_messages[0].text()).expect("tool payload is json");
    assert_eq!(payload["images"], json!([{"ref": "image-1"}]));
    assert_eq!(requests[0].tools, requests[1].tools);
    assert!(!requests[0].tools.is_empty());
}

#[tokio::test]
async fn half_answered_tool_group_is_repaired_before_resubmission() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let user = UserId::from("u1");
    let seeded = vec![
        ConversationTurn::human(user.clone(), "draw two cats"),
        ConversationTurn::assistant(
            user.clone(),
            "",
            vec![
                call("c1", "generate_image", json!({"prompt": "cat 1"})),
                call("c2", "generate_image", json!({"prompt": "cat 2"})),
            ],
        ),
        ConversationTurn::tool(
            user.clone(),
            &ToolResult::new("c1", json!({"status": "completed"})),
        ),
        ConversationTurn::human(user.clone(), "and now?"),
    ];
    for turn in seeded {
        fixture.store.append(turn).await.expect("seed history");
    }
    let strategy = Arc::new(ScriptedStrategy::new(vec![
        Err(ProviderError::malformed_history(
            "messages with role 'tool' must be a response to a preceding message with 'tool_calls'",
        )),
        Ok(text_response("Hello again!")),
    ]));

    let report = fixture
        .orchestrator(strategy.clone())
        .run_exchange(InboundMessage::text("u1", "hello"))
        .await
        .expect("exchange runs");

    assert!(report.outcome.is_answered());
    assert_eq!(report.history_repairs, 1);

    let requests = strategy.requests();
    assert_eq!(requests.len(), 2);
    let resubmitted = requests[1]
        .messages
        .iter()
        .map(|message| (message.role, message.text()))
        .collect::<Vec<_>>();
    assert_eq!(
        resubmitted,
        [
            (Role::Human, "draw two cats".to_string()),
            (Role::Human, "and now?".to_string()),
            (Role::Human, "hello".to_string()),
        ]
    );
}

#[tokio::test]
async fn reminder_in_the_past_becomes_a_plain_text_answer() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let past = (Utc::now() - ChronoDuration::hours(2)).to_rfc3339();
    let strategy = Arc::new(ScriptedStrategy::new(vec![Ok(calls_response(vec![call(
        "call_1",
        "add_notification",
        json!({"when": past, "text": "call mom"}),
    )]))]));

    let report = fixture
        .orchestrator(strategy.clone())
        .run_exchange(InboundMessage::text("u1", "remind me two hours ago"))
        .await
        .expect("exchange runs");

    let ExchangeOutcome::Answered(answer) = &report.outcome else {
        panic!("expected an answer, got {:?}", report.outcome);
    };
    assert_eq!(answer.kind, AnswerKind::Text);
    assert!(answer.text.contains("already passed"));
    assert_eq!(strategy.requests().len(), 1);
    assert!(
        fixture
            .notifications
            .active(&UserId::from("u1"))
            .expect("notifications readable")
            .is_empty()
    );
    assert!(is_structurally_valid(&fixture.log("u1")));
}

#[tokio::test]
async fn scheduled_reminder_is_confirmed_as_a_notification_answer() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let future = (Utc::now() + ChronoDuration::hours(2)).to_rfc3339();
    let strategy = Arc::new(ScriptedStrategy::new(vec![
        Ok(calls_response(vec![call(
            "call_1",
            "add_notification",
            json!({"when": future, "text": "stretch"}),
        )])),
        Ok(text_response("")),
    ]));

    let report = fixture
        .orchestrator(strategy)
        .run_exchange(InboundMessage::text("u1", "remind me in two hours to stretch"))
        .await
        .expect("exchange runs");

    let ExchangeOutcome::Answered(answer) = &report.outcome else {
        panic!("expected an answer, got {:?}", report.outcome);
    };
    assert_eq!(answer.kind, AnswerKind::Notification);
    assert!(answer.text.contains("stretch"));
    assert_eq!(
        fixture
            .notifications
            .active(&UserId::from("u1"))
            .expect("notifications readable")
            .len(),
        1
    );
}

#[tokio::test]
async fn identical_calls_in_one_turn_execute_and_charge_once() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Premium, 5, 0));
    let strategy = Arc::new(ScriptedStrategy::new(vec![
        Ok(calls_response(vec![
            call("c1", "generate_image", json!({"prompt": "cat", "count": 1})),
            call("c2", "generate_image", json!({"count": 1, "prompt": "cat"})),
        ])),
        Ok(text_response("done")),
    ]));

    let report = fixture
        .orchestrator(strategy)
        .run_exchange(InboundMessage::text("u1", "a cat please"))
        .await
        .expect("exchange runs");

    assert_eq!(fixture.generator.calls().len(), 1);
    assert_eq!(fixture.subscriptions.decrements(), [(QuotaKind::Image, 1)]);
    assert_eq!(report.duplicate_tool_calls, 1);
    assert_eq!(report.executed_tool_calls, 1);

    let log = fixture.log("u1");
    assert_eq!(log[1].tool_calls.len(), 1);
    assert!(is_structurally_valid(&log));
}

#[tokio::test]
async fn exhausted_image_quota_never_reaches_the_generator() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Standard, 0, 3));
    let strategy = Arc::new(ScriptedStrategy::new(vec![Ok(calls_response(vec![call(
        "c1",
        "generate_image",
        json!({"prompt": "cat"}),
    )]))]));

    let report = fixture
        .orchestrator(strategy)
        .run_exchange(InboundMessage::text("u1", "a cat please"))
        .await
        .expect("exchange runs");

    assert!(matches!(
        report.outcome,
        ExchangeOutcome::DeniedByQuota {
            kind: QuotaKind::Image,
            ..
        }
    ));
    assert!(fixture.generator.calls().is_empty());
    assert!(fixture.subscriptions.decrements().is_empty());
}

#[tokio::test]
async fn unlimited_tier_ignores_the_remaining_counter() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Unlimited, 0, 0));
    let strategy = Arc::new(ScriptedStrategy::new(vec![
        Ok(calls_response(vec![call(
            "c1",
            "generate_image",
            json!({"prompt": "cat", "count": 2}),
        )])),
        Ok(text_response("two cats")),
    ]));

    let report = fixture
        .orchestrator(strategy)
        .run_exchange(InboundMessage::text("u1", "two cats"))
        .await
        .expect("exchange runs");

    assert!(report.outcome.is_answered());
    assert_eq!(fixture.subscriptions.decrements(), [(QuotaKind::Image, 2)]);
}

#[tokio::test]
async fn exactly_one_final_assistant_turn_after_several_tool_rounds() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![
        Ok(calls_response(vec![call("c1", "search_web", json!({"query": "weather"}))])),
        Ok(calls_response(vec![call("c2", "search_web", json!({"query": "forecast"}))])),
        Ok(text_response("Sunny all week.")),
    ]));

    let report = fixture
        .orchestrator(strategy)
        .run_exchange(InboundMessage::text("u1", "weather?"))
        .await
        .expect("exchange runs");

    assert_eq!(report.rounds, 3);
    assert!(!report.round_limit_reached);
    let log = fixture.log("u1");
    assert_eq!(assistant_finals(&log), 1);
    assert_eq!(log.last().map(|turn| turn.content.as_str()), Some("Sunny all week."));
    assert!(is_structurally_valid(&log));
}

#[tokio::test]
async fn round_limit_stops_the_loop_and_answers_from_tool_output() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![
        Ok(calls_response(vec![call("c1", "search_web", json!({"query": "a"}))])),
        Ok(calls_response(vec![call("c2", "search_web", json!({"query": "b"}))])),
        Ok(text_response("never requested")),
    ]));
    let orchestrator = fixture.orchestrator_with(
        strategy.clone(),
        Fixture::policy().with_max_tool_round_trips(2),
    );

    let report = orchestrator
        .run_exchange(InboundMessage::text("u1", "loop forever"))
        .await
        .expect("exchange runs");

    assert!(report.round_limit_reached);
    assert_eq!(report.rounds, 2);
    assert_eq!(strategy.requests().len(), 2);
    assert_eq!(fixture.search.queries(), ["a".to_string()]);
    let ExchangeOutcome::Answered(answer) = &report.outcome else {
        panic!("expected an answer, got {:?}", report.outcome);
    };
    assert_eq!(answer.kind, AnswerKind::Search);
    assert_eq!(answer.text, "answer for a");

    let log = fixture.log("u1");
    assert_eq!(assistant_finals(&log), 1);
    assert!(is_structurally_valid(&log));
}

#[tokio::test]
async fn transient_errors_are_retried_then_succeed() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![
        Err(ProviderError::timeout("read timed out")),
        Err(ProviderError::unavailable("503")),
        Ok(text_response("hi")),
    ]));

    let report = fixture
        .orchestrator(strategy.clone())
        .run_exchange(InboundMessage::text("u1", "hello"))
        .await
        .expect("exchange runs");

    assert!(report.outcome.is_answered());
    assert_eq!(strategy.requests().len(), 3);
}

#[tokio::test]
async fn transient_errors_past_the_attempt_ceiling_fail_with_an_apology() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let max_attempts = Fixture::policy().retry.max_attempts;
    let strategy = Arc::new(ScriptedStrategy::new(
        (0..=max_attempts)
            .map(|_| Err(ProviderError::timeout("read timed out")))
            .collect(),
    ));

    let report = fixture
        .orchestrator(strategy.clone())
        .run_exchange(InboundMessage::text("u1", "hello"))
        .await
        .expect("exchange runs");

    assert_eq!(
        report.outcome,
        ExchangeOutcome::Failed {
            message: TRANSIENT_MESSAGE.to_string(),
            kind: ChatErrorKind::ProviderTransient,
        }
    );
    assert_eq!(strategy.requests().len(), max_attempts as usize);
}

#[tokio::test]
async fn authentication_failures_are_not_retried_and_stay_generic() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![Err(
        ProviderError::authentication("invalid api key sk-live-123"),
    )]));

    let report = fixture
        .orchestrator(strategy.clone())
        .run_exchange(InboundMessage::text("u1", "hello"))
        .await
        .expect("exchange runs");

    assert_eq!(
        report.outcome,
        ExchangeOutcome::Failed {
            message: SERVICE_FAILURE_MESSAGE.to_string(),
            kind: ChatErrorKind::ProviderFatal,
        }
    );
    assert_eq!(strategy.requests().len(), 1);
}

#[tokio::test]
async fn content_policy_blocks_use_one_stable_message() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![Err(
        ProviderError::content_policy("Your request was rejected by the safety system"),
    )]));

    let report = fixture
        .orchestrator(strategy.clone())
        .run_exchange(InboundMessage::text("u1", "something bad"))
        .await
        .expect("exchange runs");

    assert_eq!(report.outcome.user_text(), CONTENT_POLICY_MESSAGE);
    assert_eq!(strategy.requests().len(), 1);
}

#[tokio::test]
async fn persistent_malformed_history_is_stripped_once_then_fails() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![
        Err(ProviderError::malformed_history("bad order")),
        Err(ProviderError::malformed_history("bad order")),
        Err(ProviderError::malformed_history("bad order")),
        Ok(text_response("unreachable")),
    ]));

    let report = fixture
        .orchestrator(strategy.clone())
        .run_exchange(InboundMessage::text("u1", "hello"))
        .await
        .expect("exchange runs");

    assert!(matches!(
        report.outcome,
        ExchangeOutcome::Failed {
            kind: ChatErrorKind::MalformedHistory,
            ..
        }
    ));
    assert_eq!(report.history_repairs, 2);
    assert_eq!(strategy.requests().len(), 3);
}

#[tokio::test]
async fn storage_failures_do_not_abort_the_exchange() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![Ok(text_response("still here"))]));
    let orchestrator = ExchangeOrchestrator::builder(strategy, fixture.dispatcher())
        .history_store(Arc::new(FailingStore))
        .policy(Fixture::policy())
        .build()
        .expect("valid config");

    let report = orchestrator
        .run_exchange(InboundMessage::text("u1", "hello"))
        .await
        .expect("exchange runs");

    assert!(report.outcome.is_answered());
    assert_eq!(report.storage_failures, 2);
}

#[tokio::test]
async fn unsupported_documents_are_rejected_before_locking_or_storing() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::default());
    let orchestrator = fixture.orchestrator(strategy.clone());

    let error = orchestrator
        .run_exchange(
            InboundMessage::text("u1", "read this")
                .with_document(InboundDocument::new("deck.pptx", vec![1_u8, 2, 3])),
        )
        .await
        .expect_err("pptx is rejected");

    assert_eq!(error.kind, ChatErrorKind::InvalidRequest);
    assert!(strategy.requests().is_empty());
    assert!(fixture.log("u1").is_empty());
}

#[tokio::test]
async fn lock_is_released_after_failed_exchanges() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![Err(ProviderError::other("boom"))]));
    let orchestrator = fixture.orchestrator(strategy);

    let report = orchestrator
        .run_exchange(InboundMessage::text("u1", "hello"))
        .await
        .expect("exchange runs");

    assert!(!report.outcome.is_answered());
    assert_eq!(orchestrator.lock().tracked_users(), 0);
}

#[tokio::test]
async fn distinct_users_run_concurrently() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(GatedStrategy::new("alice"));
    let orchestrator = Arc::new(fixture.orchestrator(strategy.clone()));

    let alice = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .run_exchange(InboundMessage::text("alice", "slow question"))
                .await
        })
    };
    strategy.entered.notified().await;

    let bob = tokio::time::timeout(
        Duration::from_secs(2),
        orchestrator.run_exchange(InboundMessage::text("bob", "quick question")),
    )
    .await
    .expect("bob is not blocked by alice")
    .expect("bob's exchange runs");
    assert_eq!(bob.outcome.user_text(), "re: quick question");

    strategy.open();
    let alice = alice.await.expect("alice task").expect("alice's exchange runs");
    assert_eq!(alice.outcome.user_text(), "re: slow question");
}

#[tokio::test]
async fn exchanges_for_one_user_never_interleave() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(GatedStrategy::new("u1"));
    let orchestrator = Arc::new(fixture.orchestrator(strategy.clone()));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .run_exchange(InboundMessage::text("u1", "first"))
                .await
        })
    };
    strategy.entered.notified().await;

    let second = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .run_exchange(InboundMessage::text("u1", "second"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fixture.log("u1").len(), 1, "second exchange must wait for the lock");

    strategy.open();
    first.await.expect("first task").expect("first exchange");
    second.await.expect("second task").expect("second exchange");

    let contents = fixture
        .log("u1")
        .into_iter()
        .map(|turn| turn.content)
        .collect::<Vec<_>>();
    assert_eq!(contents, ["first", "re: first", "second", "re: second"]);
}

#[tokio::test]
async fn clear_conversation_empties_the_log() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let strategy = Arc::new(ScriptedStrategy::new(vec![Ok(text_response("hi"))]));
    let orchestrator = fixture.orchestrator(strategy);

    orchestrator
        .run_exchange(InboundMessage::text("u1", "hello"))
        .await
        .expect("exchange runs");
    assert_eq!(fixture.log("u1").len(), 2);

    orchestrator
        .clear_conversation(&UserId::from("u1"))
        .await
        .expect("clear succeeds");
    assert!(fixture.log("u1").is_empty());
}
