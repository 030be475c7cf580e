//! WebSocket transport: one socket carries one extension channel.

pub mod session;

pub use session::{FrameOutcome, handle_text_frame, run_extension_session};
