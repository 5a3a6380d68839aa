//! Chat session scenarios over the in-memory channel and service.

use std::sync::Arc;

use chat_widget_engine::config::WidgetConfig;
use chat_widget_engine::markdown::{MarkdownRenderer, TYPING_CURSOR};
use chat_widget_engine::protocol::*;
use serde_json::json;

type Session = ChatSession<MemoryService, MemoryConnector>;

struct Harness {
    session: Session,
    service: MemoryService,
    remote: MemoryRemote,
}

fn config() -> WidgetConfig {
    WidgetConfig::builder("https://bots.example.com", "widget-1").build().unwrap()
}

fn harness_with(service: MemoryService) -> Harness {
    let (connector, remote) = MemoryConnector::pair();
    let session = ChatSession::new(config(), service.clone(), connector, Arc::new(MarkdownRenderer::new()));
    Harness {
        session,
        service,
        remote,
    }
}

async fn ready() -> Harness {
    let mut h = harness_with(MemoryService::new());
    h.session.bootstrap().await.unwrap();
    h
}

fn history_entry(role: Role, text: &str, id: &str) -> HistoryEntry {
    HistoryEntry {
        role,
        text: text.into(),
        id: Some(id.into()),
        timestamp: None,
        references: Vec::new(),
        upvote: false,
        downvote: false,
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_bootstrap_restores_history_rendered() {
    let service = MemoryService::new().with_history(vec![
        history_entry(Role::Human, "<hi>", "h1"),
        history_entry(Role::Ai, "**hello**", "a1"),
    ]);
    let mut h = harness_with(service);
    h.session.bootstrap().await.unwrap();

    assert_eq!(h.session.chat_id(), Some("chat-1"));
    let t = h.session.transcript();
    assert_eq!(t.len(), 2);
    assert_eq!(t[0].html, "&lt;hi&gt;");
    assert_eq!(t[1].id, "a1");
    assert_eq!(t[1].html, "<strong>hello</strong>");
    assert!(t[1].feedback);
    assert_eq!(
        h.service.calls(),
        vec![ServiceCall::ChatId, ServiceCall::History("chat-1".into())]
    );
}

#[tokio::test]
async fn test_bootstrap_failure_refuses_everything_after() {
    let mut h = harness_with(MemoryService::new());
    h.service.set_unavailable(true);
    let mut events = h.session.subscribe();

    assert!(h.session.bootstrap().await.is_err());
    assert!(matches!(events.try_recv(), Ok(SessionEvent::Fatal(_))));
    assert!(h.session.ask_question("hello", Vec::new()).await.is_err());
    assert!(h.session.sync_context(json!({})).await.is_err());
    assert!(h.remote.connected_urls().is_empty());
}

#[tokio::test]
async fn test_first_question_without_bootstrap_keeps_exchange() {
    let service = MemoryService::new().with_history(vec![history_entry(Role::Ai, "old", "a0")]);
    let mut h = harness_with(service);

    assert_eq!(h.session.ask_question("hi", Vec::new()).await.unwrap(), AskOutcome::Sent);
    h.remote.push_frame(json!({"type": "message", "data": "answer"}));
    h.remote.push_frame(json!({"type": "stop"}));
    h.session.run_until_idle().await;

    let texts: Vec<_> = h.session.transcript().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["old", "hi", "answer"]);
    assert_eq!(h.session.transcript()[1].role, Role::Human);
    assert_eq!(h.session.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_lazy_bootstrap_failure_keeps_transcript_empty() {
    let mut h = harness_with(MemoryService::new());
    h.service.set_unavailable(true);
    assert!(matches!(
        h.session.ask_question("hi", Vec::new()).await,
        Err(chat_widget_engine::error::WidgetError::Unavailable)
    ));
    assert!(h.session.transcript().is_empty());
    assert_eq!(h.session.phase(), Phase::Idle);
    assert!(h.remote.connected_urls().is_empty());
}

// ---------------------------------------------------------------------------
// Streaming exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_streamed_answer_shows_cursor_until_stop() {
    let mut h = ready().await;
    let mut events = h.session.subscribe();
    assert_eq!(h.session.ask_question("Say hello", Vec::new()).await.unwrap(), AskOutcome::Sent);
    assert_eq!(
        h.remote.connected_urls(),
        vec!["wss://bots.example.com/api/chat/widget-1/chat-1/ws".to_string()]
    );

    h.remote.push_frame(json!({"type": "start"}));
    for chunk in ["Hel", "lo **wo"] {
        h.remote.push_frame(json!({"type": "message", "data": chunk}));
    }
    h.session.pump().await;
    h.session.pump().await;
    assert_eq!(h.session.phase(), Phase::Typing);
    h.session.pump().await;
    let html = &h.session.transcript().last().unwrap().html;
    assert_eq!(html, &format!("Hello <strong>wo</strong>{TYPING_CURSOR}"));

    h.remote.push_frame(json!({"type": "message", "data": "rld**"}));
    h.remote.push_frame(json!({"type": "stop", "id": "answer-1"}));
    h.session.run_until_idle().await;

    let last = h.session.transcript().last().unwrap();
    assert_eq!(h.session.phase(), Phase::Idle);
    assert_eq!(last.id, "answer-1");
    assert_eq!(last.html, "Hello <strong>world</strong>");
    assert!(!last.html.contains("typing-cursor"));

    let mut phases = Vec::new();
    let mut issued = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::PhaseChanged(p) => phases.push(p),
            SessionEvent::QuestionIssued { text, .. } => issued = text == "Say hello",
            _ => {}
        }
    }
    assert!(issued);
    assert_eq!(phases, vec![Phase::Waiting, Phase::Typing, Phase::Idle]);
}

#[tokio::test]
async fn test_error_before_first_chunk_replaces_placeholder() {
    let mut h = ready().await;
    h.session.ask_question("q", Vec::new()).await.unwrap();
    h.remote.push_frame(json!({"type": "error", "data": "model <overloaded>"}));
    h.session.run_until_idle().await;

    let t = h.session.transcript();
    assert_eq!(t.len(), 2);
    assert!(t.iter().all(|m| !m.is_placeholder()));
    assert_eq!(t[1].kind, MessageKind::Error);
    assert_eq!(t[1].html, "model &lt;overloaded&gt;");
    assert_eq!(h.session.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_asking_while_busy_stops_instead() {
    let mut h = ready().await;
    h.session.ask_question("first", Vec::new()).await.unwrap();
    h.remote.push_frame(json!({"type": "message", "data": "partial"}));
    h.session.pump().await;

    let outcome = h.session.ask_question("second", Vec::new()).await.unwrap();
    assert_eq!(outcome, AskOutcome::Stopped);
    assert_eq!(h.session.phase(), Phase::Idle);
    assert_eq!(h.remote.close_codes(), vec![NORMAL_CLOSURE]);
    assert_eq!(h.remote.sent().len(), 1);

    let t = h.session.transcript();
    assert_eq!(t.len(), 2);
    assert_eq!(t[1].html, "partial");
    assert!(t.iter().all(|m| !m.is_placeholder()));
}

#[tokio::test]
async fn test_stop_before_any_chunk_removes_placeholder() {
    let mut h = ready().await;
    h.session.ask_question("q", Vec::new()).await.unwrap();
    h.session.stop().await;
    assert_eq!(h.session.transcript().len(), 1);
    assert_eq!(h.session.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_dropped_channel_tears_down_and_reconnects() {
    let mut h = ready().await;
    h.session.ask_question("q", Vec::new()).await.unwrap();
    h.remote.push_frame(json!({"type": "message", "data": "half"}));
    h.remote.close(1011);
    h.session.run_until_idle().await;

    assert_eq!(h.session.phase(), Phase::Idle);
    assert!(!h.session.is_connected());
    assert_eq!(h.session.transcript()[1].html, "half");

    h.session.ask_question("again", Vec::new()).await.unwrap();
    assert_eq!(h.remote.connected_urls().len(), 2);
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let mut h = ready().await;
    h.session.ask_question("q", Vec::new()).await.unwrap();
    h.remote.push_raw("{not json");
    h.remote.push_frame(json!({"type": "unknown"}));
    h.remote.push_frame(json!({"type": "message", "data": "ok"}));
    h.remote.push_frame(json!({"type": "stop"}));
    h.session.run_until_idle().await;
    assert_eq!(h.session.transcript().last().unwrap().text, "ok");
}

#[tokio::test]
async fn test_welcome_arrives_on_eager_connect() {
    let mut h = ready().await;
    h.session.connect().await.unwrap();
    h.remote.push_frame(json!({
        "type": "welcome",
        "data": "Hi, ask me *anything*",
        "related_question": ["What is this?"]
    }));
    assert!(h.session.pump().await);
    let t = h.session.transcript();
    assert_eq!(t.len(), 1);
    assert_eq!(t[0].kind, MessageKind::Welcome);
    assert_eq!(t[0].html, "Hi, ask me <em>anything</em>");
    assert_eq!(t[0].related_questions, vec!["What is this?"]);
}

#[tokio::test]
async fn test_question_with_images_sends_content_parts() {
    let mut h = ready().await;
    h.session
        .ask_question("what is this", vec!["data:image/png;base64,AAAA".into()])
        .await
        .unwrap();
    let sent = h.remote.sent();
    assert_eq!(sent[0]["data"][0]["text"], "what is this");
    assert_eq!(sent[0]["data"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    assert_eq!(h.session.transcript()[0].images.len(), 1);
}

// ---------------------------------------------------------------------------
// Clear, reset and votes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_clear_command_only_hits_clear_endpoint() {
    let mut h = ready().await;
    h.session.ask_question("q", Vec::new()).await.unwrap();
    h.remote.push_frame(json!({"type": "stop", "data": "a"}));
    h.session.run_until_idle().await;
    let sent_before = h.remote.sent().len();
    let calls_before = h.service.calls().len();

    assert_eq!(h.session.ask_question("/clear", Vec::new()).await.unwrap(), AskOutcome::Cleared);

    assert!(h.session.transcript().is_empty());
    assert_eq!(h.remote.sent().len(), sent_before);
    assert_eq!(
        h.service.calls()[calls_before..].to_vec(),
        vec![ServiceCall::Clear {
            chat_id: "chat-1".into(),
            hard: false
        }]
    );
}

#[tokio::test]
async fn test_reset_command_starts_a_new_chat() {
    let mut h = ready().await;
    h.session.connect().await.unwrap();
    assert_eq!(h.session.ask_question("/reset", Vec::new()).await.unwrap(), AskOutcome::Cleared);
    assert_eq!(h.session.chat_id(), Some("chat-2"));
    assert_eq!(h.remote.close_codes(), vec![NORMAL_CLOSURE]);
    assert!(!h.session.is_connected());
}

#[tokio::test]
async fn test_reset_with_service_down_marks_session_unavailable() {
    let mut h = ready().await;
    let mut events = h.session.subscribe();
    h.service.set_unavailable(true);

    assert_eq!(h.session.ask_question("/reset", Vec::new()).await.unwrap(), AskOutcome::Cleared);
    assert!(h.session.is_unavailable());
    assert_eq!(h.session.chat_id(), None);
    let mut fatal = false;
    while let Ok(event) = events.try_recv() {
        fatal |= matches!(event, SessionEvent::Fatal(_));
    }
    assert!(fatal);
    assert!(h.session.ask_question("hi", Vec::new()).await.is_err());
}

#[tokio::test]
async fn test_failed_clear_keeps_transcript_and_warns() {
    let mut h = ready().await;
    h.session.ask_question("q", Vec::new()).await.unwrap();
    h.session.stop().await;
    h.service.fail_side_requests(true);
    let mut events = h.session.subscribe();

    h.session.clear(false).await;
    assert_eq!(h.session.transcript().len(), 1);
    let mut warned = false;
    while let Ok(event) = events.try_recv() {
        warned |= matches!(event, SessionEvent::Warning(_));
    }
    assert!(warned);
}

#[tokio::test]
async fn test_vote_is_sent_once_per_change() {
    let service = MemoryService::new().with_history(vec![history_entry(Role::Ai, "answer", "a1")]);
    let mut h = harness_with(service);
    h.session.bootstrap().await.unwrap();

    h.session.vote("a1", true, false).await;
    h.session.vote("a1", true, false).await;
    assert!(h.session.transcript()[0].upvote);

    let votes: Vec<_> = h
        .service
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ServiceCall::Vote(_)))
        .collect();
    assert_eq!(
        votes,
        vec![ServiceCall::Vote(VoteRequest {
            messageid: "a1".into(),
            upvote: true,
            downvote: false
        })]
    );
}

#[tokio::test]
async fn test_failed_vote_leaves_message_unchanged() {
    let service = MemoryService::new().with_history(vec![history_entry(Role::Ai, "answer", "a1")]);
    let mut h = harness_with(service);
    h.session.bootstrap().await.unwrap();
    h.service.fail_side_requests(true);

    h.session.vote("a1", false, true).await;
    assert!(!h.session.transcript()[0].downvote);
}

#[test]
fn test_session_future_is_driven_by_tokio_test() {
    let mut h = harness_with(MemoryService::new());
    tokio_test::block_on(async {
        h.session.bootstrap().await.unwrap();
        h.session.sync_context(json!({"url": "/pricing"})).await.unwrap();
    });
    assert_eq!(h.remote.sent()[0]["type"], "bot_context");
}
