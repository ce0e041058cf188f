pub mod agent;
pub mod audio;
pub mod call;
pub mod config;
pub mod http;
pub mod live;

pub use audio::{
    AudioChunk, CallRecorder, CaptureBackend, CaptureConfig, OutputSink, PlaybackBuffer,
    PlaybackQueue, ScriptedCapture,
};
pub use call::{CallSession, CallStats, ConversationState};
pub use config::Config;
pub use http::{create_router, AppState};
pub use live::{ClientMessage, LiveSession, ScriptedSession, SessionEvent, SetupMessage};
