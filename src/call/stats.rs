use super::state::ConversationState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observable snapshot of a call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStats {
    /// Whether the call is currently active
    pub is_active: bool,

    /// Whether outbound audio is currently gated
    pub is_muted: bool,

    /// Current conversation phase
    pub state: ConversationState,

    /// When the call started
    pub started_at: DateTime<Utc>,

    /// Elapsed duration in seconds
    pub duration_secs: f64,

    /// Audio chunks transmitted so far
    pub chunks_sent: usize,

    /// Inbound audio fragments scheduled for playback
    pub fragments_played: usize,
}
