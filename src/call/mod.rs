//! Call session management
//!
//! This module provides the `CallSession` abstraction that manages:
//! - Microphone capture and outbound audio transmission
//! - The conversation state machine driven by session events
//! - Gapless playback scheduling of inbound audio fragments
//! - Mute gating, teardown, and observable call statistics

mod session;
mod state;
mod stats;

pub use session::CallSession;
pub use state::{transition, BridgeEvent, ConversationState, Effect};
pub use stats::CallStats;
