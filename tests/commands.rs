//! Operator command handling and reporting notices.

mod common;

use std::sync::atomic::Ordering;

use common::{Action, Harness};
use postwatch::domain::{CommandError, InboundCommand, PostStatus, PostUpdate};
use postwatch::Outcome;

async fn with_posts(ids: &[&str]) -> Harness {
    let h = Harness::new().await;
    h.source.set(ids);
    h.engine.run_cycle().await.unwrap();
    h
}

#[tokio::test]
async fn test_like_only_leaves_status_unchanged() {
    let h = with_posts(&["p1"]).await;
    let before = h.store.find("p1").await.unwrap();

    let outcome = h.command("just_like", &[h.token_of("p1").as_str()]).await;

    assert_eq!(
        outcome,
        Outcome::Liked {
            post_id: "p1".to_string(),
            success: true
        }
    );
    assert_eq!(
        h.executor.actions(),
        vec![Action::Like {
            url: "https://example.com/p1".to_string()
        }]
    );
    assert_eq!(h.store.find("p1").await.unwrap(), before);
    assert!(h.channel.last_notice().contains("liked"));
}

#[tokio::test]
async fn test_like_failure_is_reported() {
    let h = with_posts(&["p1"]).await;
    h.executor.fail_like.store(true, Ordering::SeqCst);

    let outcome = h.command("like", &[h.token_of("p1").as_str()]).await;

    assert!(matches!(outcome, Outcome::Liked { success: false, .. }));
    assert_eq!(
        h.store.find("p1").await.unwrap().status,
        PostStatus::PendingApproval
    );
    assert!(h.channel.last_notice().contains("Failed to like"));
}

#[tokio::test]
async fn test_publish_plain_sends_no_commentary() {
    let h = with_posts(&["p1"]).await;

    let outcome = h.command("publish_plain", &[h.token_of("p1").as_str()]).await;

    assert!(matches!(outcome, Outcome::Published { .. }));
    assert_eq!(
        h.executor.actions(),
        vec![Action::PublishPlain {
            url: "https://example.com/p1".to_string()
        }]
    );
    assert_eq!(h.store.find("p1").await.unwrap().status, PostStatus::Posted);
}

#[tokio::test]
async fn test_revise_publishes_operator_commentary() {
    let h = with_posts(&["p1"]).await;
    let token = h.token_of("p1");

    let outcome = h
        .command("revise", &[token.as_str(), "My", "own", "take"])
        .await;

    assert!(matches!(outcome, Outcome::Published { .. }));
    assert_eq!(
        h.executor.actions(),
        vec![Action::Publish {
            url: "https://example.com/p1".to_string(),
            commentary: "My own take".to_string(),
        }]
    );
    let record = h.store.find("p1").await.unwrap();
    assert_eq!(record.commentary.as_deref(), Some("My own take"));
}

#[tokio::test]
async fn test_regenerate_keeps_token_and_resends_card() {
    let h = with_posts(&["p1"]).await;
    let token = h.token_of("p1");
    let original = h.store.find("p1").await.unwrap().commentary;

    let outcome = h.command("redo", &[token.as_str()]).await;

    assert_eq!(
        outcome,
        Outcome::Regenerated {
            post_id: "p1".to_string()
        }
    );
    let record = h.store.find("p1").await.unwrap();
    assert_eq!(record.status, PostStatus::PendingApproval);
    assert_eq!(record.request_token.as_deref(), Some(token.as_str()));
    assert_ne!(record.commentary, original);

    let cards = h.channel.cards();
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[1].token, token);
    assert_eq!(cards[1].commentary, record.commentary);
}

#[tokio::test]
async fn test_regenerate_failure_keeps_previous_commentary() {
    let h = with_posts(&["p1"]).await;
    let before = h.store.find("p1").await.unwrap();
    h.generator.fail.store(true, Ordering::SeqCst);

    let outcome = h.command("regenerate", &[h.token_of("p1").as_str()]).await;

    assert!(matches!(outcome, Outcome::RegenerateFailed { .. }));
    assert_eq!(h.store.find("p1").await.unwrap(), before);
    assert!(h.channel.last_notice().contains("Failed to regenerate"));
}

#[tokio::test]
async fn test_terminal_records_refuse_commands() {
    let h = with_posts(&["p2", "p1"]).await;
    let posted = h.token_of("p2");
    let skipped = h.token_of("p1");
    h.command("approve", &[posted.as_str()]).await;
    h.command("reject", &[skipped.as_str()]).await;

    assert!(matches!(
        h.command("regenerate", &[posted.as_str()]).await,
        Outcome::Refused { .. }
    ));
    assert!(matches!(
        h.command("reject", &[posted.as_str()]).await,
        Outcome::Refused { .. }
    ));
    assert!(matches!(
        h.command("approve", &[skipped.as_str()]).await,
        Outcome::Refused { .. }
    ));
    assert!(matches!(
        h.command("publish_plain", &[skipped.as_str()]).await,
        Outcome::Refused { .. }
    ));

    assert_eq!(h.store.find("p2").await.unwrap().status, PostStatus::Posted);
    assert_eq!(h.store.find("p1").await.unwrap().status, PostStatus::Skipped);
    assert_eq!(h.executor.publish_count(), 1);
}

#[tokio::test]
async fn test_approve_without_commentary_is_refused() {
    let h = with_posts(&["p1"]).await;
    let token = h.token_of("p1");
    h.store
        .update_fields(
            "p1",
            PostUpdate {
                commentary: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcome = h.command("approve", &[token.as_str()]).await;

    assert!(matches!(outcome, Outcome::Refused { .. }));
    assert!(h.channel.last_notice().contains("/publish_plain"));
    assert!(h.executor.actions().is_empty());
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let h = with_posts(&["p1"]).await;
    let before = h.store.find("p1").await.unwrap();

    let outcome = h.command("approve", &["doesnotexist"]).await;

    assert_eq!(
        outcome,
        Outcome::NotFound {
            token: "doesnotexist".to_string()
        }
    );
    assert!(h.channel.last_notice().contains("not found"));
    assert_eq!(h.store.find("p1").await.unwrap(), before);
    assert!(h.executor.actions().is_empty());
}

#[tokio::test]
async fn test_channel_reference_resolves_command() {
    let h = with_posts(&["p1"]).await;
    let token = h.token_of("p1");

    let outcome = h
        .engine
        .handle(InboundCommand::new("reject").with_reference(token))
        .await;

    assert!(matches!(outcome, Outcome::Skipped { .. }));
}

#[tokio::test]
async fn test_malformed_commands_are_reported() {
    let h = with_posts(&["p1"]).await;

    let outcome = h.command("approve", &[]).await;
    assert_eq!(
        outcome,
        Outcome::Invalid(CommandError::MissingReference("approve".to_string()))
    );

    let outcome = h.command("frobnicate", &[]).await;
    assert!(matches!(
        outcome,
        Outcome::Invalid(CommandError::UnknownCommand(_))
    ));
    assert!(h.channel.last_notice().contains("Unknown command"));

    let outcome = h.command("resend", &["0"]).await;
    assert!(matches!(
        outcome,
        Outcome::Invalid(CommandError::InvalidArgument { .. })
    ));

    assert_eq!(
        h.store.find("p1").await.unwrap().status,
        PostStatus::PendingApproval
    );
}

#[tokio::test]
async fn test_resend_sends_cards_with_status_notes() {
    let h = with_posts(&["p3", "p2", "p1"]).await;
    h.command("approve", &[h.token_of("p3").as_str()]).await;
    let cards_before = h.channel.cards().len();

    let outcome = h.command("resend", &[]).await;

    assert_eq!(outcome, Outcome::Reported { cards_sent: 3 });
    let resent = &h.channel.cards()[cards_before..];
    assert_eq!(resent.len(), 3);
    assert!(resent
        .iter()
        .all(|card| card.status_note.is_some()));
    assert!(resent
        .iter()
        .any(|card| card.status_note.as_deref().unwrap().starts_with("ALREADY PUBLISHED")));
}

#[tokio::test]
async fn test_resend_mints_token_for_tokenless_record() {
    let h = Harness::new().await;
    h.generator.fail.store(true, Ordering::SeqCst);
    h.source.set(&["p1"]);
    h.engine.run_cycle().await.unwrap();
    assert!(h.store.find("p1").await.unwrap().request_token.is_none());

    h.command("resend", &[]).await;

    let record = h.store.find("p1").await.unwrap();
    let token = record.request_token.clone().unwrap();
    assert_eq!(h.token_of("p1"), token);
    assert!(h
        .channel
        .card_for("/p1")
        .unwrap()
        .status_note
        .unwrap()
        .starts_with("FAILED"));
}

#[tokio::test]
async fn test_resend_pending_only_sends_pending() {
    let h = with_posts(&["p3", "p2", "p1"]).await;
    h.command("reject", &[h.token_of("p2").as_str()]).await;
    let cards_before = h.channel.cards().len();

    let outcome = h.command("send_pending", &[]).await;

    assert_eq!(outcome, Outcome::Reported { cards_sent: 2 });
    let urls: Vec<String> = h.channel.cards()[cards_before..]
        .iter()
        .map(|c| c.url.clone())
        .collect();
    assert_eq!(urls.len(), 2);
    assert!(urls.contains(&"https://example.com/p3".to_string()));
    assert!(urls.contains(&"https://example.com/p1".to_string()));
    assert!(!urls.iter().any(|u| u.ends_with("/p2")));
}

#[tokio::test]
async fn test_resend_on_empty_store() {
    let h = Harness::new().await;

    let outcome = h.command("resend_pending", &[]).await;

    assert_eq!(outcome, Outcome::Reported { cards_sent: 0 });
    assert!(h.channel.last_notice().contains("No pending posts"));
}

#[tokio::test]
async fn test_summary_and_statistics_notices() {
    let h = with_posts(&["p2", "p1"]).await;
    h.command("approve", &[h.token_of("p2").as_str()]).await;

    h.command("summary", &[]).await;
    let summary = h.channel.last_notice();
    assert!(summary.contains("Last 2 posts"));
    assert!(summary.contains("Published: https://example.com/share/"));

    h.command("stats", &[]).await;
    let stats = h.channel.last_notice();
    assert!(stats.contains("Total posts: 2"));
    assert!(stats.contains("posted: 1"));
    assert!(stats.contains("pending_approval: 1"));
    assert!(stats.contains("Published: 1"));

    h.command("help", &[]).await;
    assert!(h.channel.last_notice().contains("/approve"));
}

#[tokio::test]
async fn test_resend_during_enrichment_sends_live_token() {
    let h = Harness::new().await;
    h.source.set(&["p1"]);

    let gate = h.generator.gate.write().await;
    let cycle = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.run_cycle().await })
    };
    while h.generator.calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // p1 is stored but still being enriched
    let resend = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.handle(InboundCommand::new("resend")).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    drop(gate);

    cycle.await.unwrap().unwrap();
    assert_eq!(resend.await.unwrap(), Outcome::Reported { cards_sent: 1 });

    let record = h.store.find("p1").await.unwrap();
    let live = record.request_token.clone().unwrap();
    let cards = h.channel.cards();
    assert_eq!(cards.len(), 2);
    assert!(cards.iter().all(|card| card.token == live));
    assert_eq!(cards[1].commentary, record.commentary);

    let outcome = h.command("approve", &[cards[1].token.as_str()]).await;
    assert!(matches!(outcome, Outcome::Published { .. }));
}
