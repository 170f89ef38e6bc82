mod support;

use pchat::prelude::*;
use pchat::{TOOL_FAILURE_MESSAGE, ToolCallState};
use ptooling::{DenialReason, ToolExecutionContext};
use serde_json::json;
use support::{CountingGenerator, FakeSubscriptions, Fixture, call};

fn context(user: &str) -> ToolExecutionContext {
    ToolExecutionContext::new(user)
}

fn states(records: &[pchat::ToolCallRecord]) -> Vec<ToolCallState> {
    records.iter().map(|record| record.state).collect()
}

#[tokio::test]
async fn one_progress_message_per_round_is_sent_and_removed() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Premium, 10, 0));
    let round = RoundCalls::dedup(vec![
        call("c1", "search_web", json!({"query": "a"})),
        call("c2", "generate_image", json!({"prompt": "cat"})),
        call("c3", "search_web", json!({"query": "b"})),
    ]);

    let outcome = fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    assert_eq!(outcome.executed, 3);
    assert_eq!(fixture.transport.sent().len(), 1);
    assert_eq!(fixture.transport.deleted(), 1);
    assert!(outcome.records.iter().all(|record| record.state.is_terminal()));
}

#[tokio::test]
async fn rounds_without_executions_send_no_progress_message() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Free, 0, 0));
    let round = RoundCalls::dedup(vec![call("c1", "generate_image", json!({"prompt": "cat"}))]);

    let outcome = fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    assert_eq!(outcome.executed, 0);
    assert!(fixture.transport.sent().is_empty());
    assert_eq!(fixture.transport.deleted(), 0);
}

#[tokio::test]
async fn denial_closes_the_remaining_calls_of_the_round() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Free, 3, 3));
    let round = RoundCalls::dedup(vec![
        call("c1", "search_web", json!({"query": "cats"})),
        call("c2", "generate_image", json!({"prompt": "cat"})),
        call("c3", "search_web", json!({"query": "dogs"})),
    ]);

    let outcome = fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    assert_eq!(
        states(&outcome.records),
        [
            ToolCallState::Completed,
            ToolCallState::Denied,
            ToolCallState::Skipped
        ]
    );
    assert_eq!(fixture.search.queries(), ["cats".to_string()]);
    let denial = outcome.denial.as_ref().expect("round was denied");
    assert_eq!(denial.reason, DenialReason::SubscriptionRequired);
    assert_eq!(denial.tool_call_id, "c2");

    let ids = outcome
        .results()
        .into_iter()
        .map(|result| result.tool_call_id)
        .collect::<Vec<_>>();
    assert_eq!(ids, ["c1", "c2", "c3"]);
    assert_eq!(outcome.results()[2].payload, json!({"status": "skipped"}));
}

#[tokio::test]
async fn generator_failures_reach_the_model_sanitized() {
    let fixture = Fixture::with_generator(
        FakeSubscriptions::tier(SubscriptionTier::Standard, 3, 0),
        CountingGenerator::failing("upstream 500 from gpu-node-7"),
    );
    let round = RoundCalls::dedup(vec![call("c1", "generate_image", json!({"prompt": "cat"}))]);

    let outcome = fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    assert_eq!(states(&outcome.records), [ToolCallState::Failed]);
    assert_eq!(
        outcome.records[0].result.payload,
        json!({"status": "failed", "message": TOOL_FAILURE_MESSAGE})
    );
    assert!(outcome.denial.is_none());
    assert!(fixture.subscriptions.decrements().is_empty());
}

#[tokio::test]
async fn invalid_arguments_are_reported_back_verbatim() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Standard, 3, 0));
    let round = RoundCalls::dedup(vec![call(
        "c1",
        "generate_image",
        json!({"prompt": "cat", "count": 9}),
    )]);

    let outcome = fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    let payload = &outcome.records[0].result.payload;
    assert_eq!(payload["status"], "failed");
    assert!(
        payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("count"))
    );
    assert!(fixture.generator.calls().is_empty());
}

#[tokio::test]
async fn every_metered_call_reads_a_fresh_quota() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Standard, 1, 0));
    let round = RoundCalls::dedup(vec![
        call("c1", "generate_image", json!({"prompt": "cat"})),
        call("c2", "generate_image", json!({"prompt": "dog"})),
    ]);

    let outcome = fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    assert_eq!(fixture.subscriptions.lookups(), 2);
    assert_eq!(
        states(&outcome.records),
        [ToolCallState::Completed, ToolCallState::Denied]
    );
    assert_eq!(
        outcome.denial.map(|denial| denial.reason),
        Some(DenialReason::QuotaExhausted(QuotaKind::Image))
    );
    assert_eq!(fixture.generator.calls().len(), 1);
}

#[tokio::test]
async fn unmetered_tools_skip_the_subscription_lookup() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let round = RoundCalls::dedup(vec![call("c1", "search_web", json!({"query": "news"}))]);

    let outcome = fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    assert_eq!(fixture.subscriptions.lookups(), 0);
    assert_eq!(outcome.text_candidates, ["answer for news".to_string()]);
}

#[tokio::test]
async fn unknown_tools_fail_without_aborting_the_round() {
    let fixture = Fixture::new(FakeSubscriptions::new(None));
    let round = RoundCalls::dedup(vec![
        call("c1", "launch_rockets", json!({})),
        call("c2", "search_web", json!({"query": "news"})),
    ]);

    let outcome = fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    assert_eq!(
        states(&outcome.records),
        [ToolCallState::Failed, ToolCallState::Completed]
    );
    assert!(!outcome.is_aborted());
}

#[tokio::test]
async fn requested_image_count_is_lowered_to_the_remaining_credits() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Standard, 1, 0));
    let round = RoundCalls::dedup(vec![call(
        "c1",
        "generate_image",
        json!({"prompt": "cat", "count": 4}),
    )]);

    let outcome = fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    assert_eq!(states(&outcome.records), [ToolCallState::Completed]);
    assert_eq!(outcome.records[0].result.tool_call_id, "c1");
    assert_eq!(fixture.generator.calls(), [("cat".to_string(), 1)]);
    assert_eq!(fixture.subscriptions.decrements(), [(QuotaKind::Image, 1)]);
}

#[tokio::test]
async fn unlimited_tiers_keep_the_requested_image_count() {
    let fixture = Fixture::new(FakeSubscriptions::tier(SubscriptionTier::Unlimited, 0, 0));
    let round = RoundCalls::dedup(vec![call(
        "c1",
        "generate_image",
        json!({"prompt": "cat", "count": 4}),
    )]);

    fixture
        .dispatcher()
        .dispatch_round(&round, &context("u1"))
        .await;

    assert_eq!(fixture.generator.calls(), [("cat".to_string(), 4)]);
}
