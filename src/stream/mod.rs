//!
//! Streaming translation: OpenAI Responses API SSE events to Anthropic
//! Messages API SSE events.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod harmony;
pub mod state;
pub mod translator;

/* --- start of code -------------------------------------------------------------------------- */

pub use state::StreamState;
pub use translator::translate_openai_event;
