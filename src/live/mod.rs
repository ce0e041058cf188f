pub mod protocol;
pub mod session;

pub use protocol::{
    ClientMessage, RealtimeInputMessage, ServerContent, ServerMessage, SetupMessage,
};
pub use session::{LiveSession, ScriptedSession, SessionEvent, WsLiveSession};
