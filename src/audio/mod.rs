pub mod capture;
pub mod pcm;
pub mod playback;
pub mod recorder;

pub use capture::{default_backend, AudioChunk, CaptureBackend, CaptureConfig, ScriptedCapture};
pub use playback::{
    default_sink, ManualClock, NullSink, OutputSink, PlaybackBuffer, PlaybackQueue,
};
pub use recorder::CallRecorder;
