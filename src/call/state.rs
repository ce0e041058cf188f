use crate::live::ServerContent;
use serde::{Deserialize, Serialize};

/// Conversation phase of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// No call in progress
    Idle,
    /// Waiting for user speech
    Listening,
    /// Remote side detected speech and is working on a reply
    Thinking,
    /// Assistant audio is being produced
    Speaking,
}

impl ConversationState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ConversationState::Idle => 0,
            ConversationState::Listening => 1,
            ConversationState::Thinking => 2,
            ConversationState::Speaking => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ConversationState::Listening,
            2 => ConversationState::Thinking,
            3 => ConversationState::Speaking,
            _ => ConversationState::Idle,
        }
    }
}

/// One event driving the conversation state machine
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// Remote confirmed the session is open
    SessionOpened,
    /// Remote transcribed a fragment of user speech
    InputTranscription,
    /// One inline audio fragment (base64 PCM16LE at the output rate)
    AudioFragment(String),
    /// The model finished its turn
    TurnComplete,
    /// User barge-in while assistant audio was still playing
    Interrupted,
    /// Remote closed the session
    SessionClosed,
    /// Transport or session failure
    SessionError(String),
}

impl BridgeEvent {
    /// Expand one streamed content message into ordered events
    ///
    /// A single message may carry several flags at once; they apply in the
    /// order the remote emits them: transcription, audio, turn completion,
    /// interruption.
    pub fn from_content(content: &ServerContent) -> Vec<BridgeEvent> {
        let mut events = Vec::new();

        if content.has_transcription() {
            events.push(BridgeEvent::InputTranscription);
        }

        if let Some(audio) = content.inline_audio() {
            events.push(BridgeEvent::AudioFragment(audio.to_string()));
        }

        if content.turn_complete {
            events.push(BridgeEvent::TurnComplete);
        }

        if content.interrupted {
            events.push(BridgeEvent::Interrupted);
        }

        events
    }
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Wire up the capture tap (only ever after open confirmation)
    StartCapture,
    /// Decode and schedule one audio fragment for playback
    SchedulePlayback(String),
    /// Stop and discard every in-flight playback source
    ClearPlayback,
    /// Release every resource the call owns
    Teardown,
}

/// Pure transition function: (state, event) -> (next state, effects)
///
/// Transitions are driven entirely by message flags, never by local timers.
/// Inline audio is the authoritative speaking signal because the session is
/// configured for audio-only output.
pub fn transition(
    state: ConversationState,
    event: &BridgeEvent,
) -> (ConversationState, Vec<Effect>) {
    use BridgeEvent::*;
    use ConversationState::*;

    match (state, event) {
        // Close and error route through the same teardown from any state
        (_, SessionClosed) | (_, SessionError(_)) => (Idle, vec![Effect::Teardown]),

        // Opening handshake; every other event is inert while idle
        (Idle, SessionOpened) => (Listening, vec![Effect::StartCapture]),
        (Idle, _) => (Idle, vec![]),

        // Active call
        (_, InputTranscription) => (Thinking, vec![]),
        (_, AudioFragment(data)) => (Speaking, vec![Effect::SchedulePlayback(data.clone())]),
        (_, TurnComplete) => (Listening, vec![]),
        (_, Interrupted) => (Listening, vec![Effect::ClearPlayback]),

        // Duplicate open confirmation changes nothing
        (active, SessionOpened) => (active, vec![]),
    }
}
