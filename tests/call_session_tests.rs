// Integration tests for call orchestration
//
// These drive a CallSession end to end with a scripted session, a scripted
// capture backend, and a silent output sink: no network, no devices.

use janmitra_voice::audio::pcm;
use janmitra_voice::audio::{AudioChunk, ManualClock, NullSink, ScriptedCapture};
use janmitra_voice::call::{CallSession, ConversationState};
use janmitra_voice::live::protocol::{InlineData, ModelTurn, Part, ServerContent, Transcription};
use janmitra_voice::live::{ClientMessage, ScriptedSession, SessionEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A call wired to scripted ends, plus the handles that drive it
struct Scripted {
    call: Arc<CallSession>,
    events: mpsc::Sender<SessionEvent>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    close_calls: Arc<AtomicUsize>,
    mic: mpsc::Sender<AudioChunk>,
}

fn scripted_call() -> Scripted {
    scripted_call_with(ScriptedCapture::new())
}

fn scripted_call_with(capture: ScriptedCapture) -> Scripted {
    let session = ScriptedSession::new();
    let events = session.events();
    let sent = session.sent();
    let close_calls = session.close_calls();
    let mic = capture.sender();

    let call = CallSession::new(
        "call-under-test".to_string(),
        Box::new(session),
        Box::new(capture),
        Box::new(NullSink::new(ManualClock::new())),
        None,
        24_000,
    );

    Scripted {
        call: Arc::new(call),
        events,
        sent,
        close_calls,
        mic,
    }
}

/// Poll an observable condition until it holds or two seconds pass
async fn wait_until<F>(mut condition: F, what: &str)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn chunk(value: f32) -> AudioChunk {
    AudioChunk {
        samples: vec![value; 160],
        sample_rate: 16_000,
        timestamp_ms: 0,
    }
}

fn transcription() -> ServerContent {
    ServerContent {
        input_transcription: Some(Transcription {
            text: "namaste".to_string(),
        }),
        ..Default::default()
    }
}

fn audio_fragment(samples: &[f32]) -> ServerContent {
    ServerContent {
        model_turn: Some(ModelTurn {
            parts: vec![Part {
                inline_data: Some(InlineData {
                    data: pcm::encode_payload(samples),
                    mime_type: "audio/pcm;rate=24000".to_string(),
                }),
            }],
        }),
        ..Default::default()
    }
}

fn turn_complete() -> ServerContent {
    ServerContent {
        turn_complete: true,
        ..Default::default()
    }
}

fn interrupted() -> ServerContent {
    ServerContent {
        interrupted: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_mute_gates_outbound_audio() {
    let scripted = scripted_call();
    let call = Arc::clone(&scripted.call);

    scripted.events.send(SessionEvent::Open).await.unwrap();
    call.start().await.unwrap();

    // Unmuted: the first tick goes out
    scripted.mic.send(chunk(0.1)).await.unwrap();
    wait_until(|| call.stats().chunks_sent == 1, "first chunk to transmit").await;

    // Muted: the tap keeps ticking but nothing is transmitted
    call.set_muted(true);
    assert!(call.is_muted());
    scripted.mic.send(chunk(0.2)).await.unwrap();
    // Parking the test task lets the pump drain the gated chunk
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(call.stats().chunks_sent, 1);

    // Unmuting resumes on the next tick, no session restart needed
    call.set_muted(false);
    scripted.mic.send(chunk(0.3)).await.unwrap();
    wait_until(|| call.stats().chunks_sent == 2, "post-unmute chunk").await;

    // Exactly the unmuted ticks are on the wire, in capture order
    let payloads: Vec<Vec<f32>> = scripted
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|message| match message {
            ClientMessage::RealtimeInput(input) => {
                pcm::decode_payload(&input.realtime_input.media.data).unwrap()
            }
            other => panic!("unexpected outbound message: {:?}", other),
        })
        .collect();

    assert_eq!(payloads.len(), 2);
    assert!((payloads[0][0] - 0.1).abs() <= 1.0 / 32768.0);
    assert!((payloads[1][0] - 0.3).abs() <= 1.0 / 32768.0);

    call.stop().await.unwrap();
}

#[tokio::test]
async fn test_conversation_follows_session_signals() {
    let scripted = scripted_call();
    let call = Arc::clone(&scripted.call);

    scripted.events.send(SessionEvent::Open).await.unwrap();
    call.start().await.unwrap();

    assert!(call.is_active());
    assert_eq!(call.conversation_state(), ConversationState::Listening);

    // The remote side transcribed user speech
    scripted
        .events
        .send(SessionEvent::Content(transcription()))
        .await
        .unwrap();
    wait_until(
        || call.conversation_state() == ConversationState::Thinking,
        "thinking state",
    )
    .await;

    // Inline audio means the assistant is replying
    scripted
        .events
        .send(SessionEvent::Content(audio_fragment(&[0.1; 240])))
        .await
        .unwrap();
    wait_until(
        || call.conversation_state() == ConversationState::Speaking,
        "speaking state",
    )
    .await;
    assert_eq!(call.stats().fragments_played, 1);

    // Turn finished: back to waiting for the user
    scripted
        .events
        .send(SessionEvent::Content(turn_complete()))
        .await
        .unwrap();
    wait_until(
        || call.conversation_state() == ConversationState::Listening,
        "listening after turn",
    )
    .await;

    // More audio, then the user barges in
    scripted
        .events
        .send(SessionEvent::Content(audio_fragment(&[0.2; 240])))
        .await
        .unwrap();
    wait_until(|| call.stats().fragments_played == 2, "second fragment").await;

    scripted
        .events
        .send(SessionEvent::Content(interrupted()))
        .await
        .unwrap();
    wait_until(
        || call.conversation_state() == ConversationState::Listening,
        "listening after barge-in",
    )
    .await;

    call.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let scripted = scripted_call();
    let call = Arc::clone(&scripted.call);

    scripted.events.send(SessionEvent::Open).await.unwrap();
    call.start().await.unwrap();
    call.set_muted(true);

    let stats = call.stop().await.unwrap();
    assert!(!stats.is_active);

    // Second stop must not throw and leaves everything idle
    let stats = call.stop().await.unwrap();
    assert!(!stats.is_active);
    assert!(!call.is_active());
    assert!(!call.is_muted(), "teardown resets the mute gate");
    assert_eq!(call.conversation_state(), ConversationState::Idle);
    assert_eq!(scripted.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_without_start_is_safe() {
    let scripted = scripted_call();
    let call = Arc::clone(&scripted.call);

    let stats = call.stop().await.unwrap();

    assert!(!stats.is_active);
    assert_eq!(call.conversation_state(), ConversationState::Idle);
    // The connected-but-unstarted session is still released
    assert_eq!(scripted.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remote_close_tears_down() {
    let scripted = scripted_call();
    let call = Arc::clone(&scripted.call);

    scripted.events.send(SessionEvent::Open).await.unwrap();
    call.start().await.unwrap();
    assert!(call.is_active());

    scripted.events.send(SessionEvent::Closed).await.unwrap();
    call.wait_ended().await;

    assert!(!call.is_active());
    assert_eq!(call.conversation_state(), ConversationState::Idle);
    assert_eq!(scripted.close_calls.load(Ordering::SeqCst), 1);

    // Stopping after a remote close is still safe
    call.stop().await.unwrap();
    assert_eq!(scripted.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_session_error_tears_down() {
    let scripted = scripted_call();
    let call = Arc::clone(&scripted.call);

    scripted.events.send(SessionEvent::Open).await.unwrap();
    call.start().await.unwrap();

    scripted
        .events
        .send(SessionEvent::Error("connection reset".to_string()))
        .await
        .unwrap();
    call.wait_ended().await;

    assert!(!call.is_active());
    assert_eq!(call.conversation_state(), ConversationState::Idle);
    assert_eq!(scripted.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_fragment_is_skipped() {
    let scripted = scripted_call();
    let call = Arc::clone(&scripted.call);

    scripted.events.send(SessionEvent::Open).await.unwrap();
    call.start().await.unwrap();

    // Inline audio whose payload is not valid base64
    let bad = ServerContent {
        model_turn: Some(ModelTurn {
            parts: vec![Part {
                inline_data: Some(InlineData {
                    data: "!!not-base64!!".to_string(),
                    mime_type: "audio/pcm;rate=24000".to_string(),
                }),
            }],
        }),
        ..Default::default()
    };

    scripted.events.send(SessionEvent::Content(bad)).await.unwrap();
    wait_until(
        || call.conversation_state() == ConversationState::Speaking,
        "speaking state",
    )
    .await;

    // The fragment was dropped without killing the call
    assert!(call.is_active());
    assert_eq!(call.stats().fragments_played, 0);

    // A healthy fragment still plays afterwards
    scripted
        .events
        .send(SessionEvent::Content(audio_fragment(&[0.1; 240])))
        .await
        .unwrap();
    wait_until(|| call.stats().fragments_played == 1, "healthy fragment").await;

    call.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_capture_fails_the_attempt() {
    let scripted = scripted_call_with(ScriptedCapture::failing());
    let call = Arc::clone(&scripted.call);

    scripted.events.send(SessionEvent::Open).await.unwrap();
    let err = call.start().await.unwrap_err();

    assert!(err.to_string().contains("capture"));
    assert!(!call.is_active());
    assert_eq!(call.conversation_state(), ConversationState::Idle);
    // The session does not leak when the input device is unavailable
    assert_eq!(scripted.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let scripted = scripted_call();
    let call = Arc::clone(&scripted.call);

    scripted.events.send(SessionEvent::Open).await.unwrap();
    call.start().await.unwrap();

    let err = call.start().await.unwrap_err();
    assert!(err.to_string().contains("already started"));

    call.stop().await.unwrap();
}
