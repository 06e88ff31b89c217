//!
//! Stream-translation state: the single owned value threaded through the
//! OpenAI-event -> Anthropic-event step function.
//!
//! Everything the translator needs to remember between frames lives here:
//! block-index allocation, tool-call/call_id binding, partial-JSON buffers,
//! the Harmony text accumulator, and the running usage snapshot. One value
//! per connection; never shared across tasks, never behind a mutex (see
//! `spec.md` §5).
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

/* --- types ----------------------------------------------------------------------------------- */

/// The kind of content a block carries, used as part of its addressing key
/// and to decide which completion rule applies to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Text,
    ToolUse,
    WebSearch,
}

/// `(output_index, content_index, kind)`, see `spec.md` §3/§4.3. Indices
/// are `None` when the inbound frame omitted them; such frames resolve to
/// whatever block was last allocated (single-block-response providers).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressingKey {
    pub output_index: Option<i64>,
    pub content_index: Option<i64>,
    pub kind: BlockKind,
}

/// Per-block mutable scratch: buffered partial tool-call JSON, start/stop
/// flags, and metadata set-once by whichever event supplies it first.
#[derive(Debug, Clone, Default)]
pub struct BlockScratch {
    pub started: bool,
    pub completed: bool,
    pub tool_id: Option<String>,
    pub tool_name: Option<String>,
    /// Concatenation of every `arguments`/`partial_json` delta seen so far,
    /// whether or not the block has started yet (see Design Note
    /// "Buffered-partial-JSON-with-late-start").
    pub arg_buffer: String,
    /// How much of `arg_buffer` has already been flushed as a delta.
    pub arg_flushed_len: usize,
}

/// Owned translator state for one streaming connection.
pub struct StreamState {
    pub message_id: String,
    pub model: String,

    next_block_index: usize,
    keys_to_index: HashMap<AddressingKeyHashable, usize>,
    last_allocated_index: Option<usize>,
    pub call_id_to_index: HashMap<String, usize>,
    pub blocks: HashMap<usize, BlockScratch>,
    pub completed_blocks: HashSet<usize>,

    pub message_start_emitted: bool,
    pub message_stop_emitted: bool,
    pub saw_tool_call: bool,
    pub saw_function_call: bool,

    /// Per-addressing-key text accumulator, used for Harmony tag scanning.
    pub harmony_buffers: HashMap<AddressingKeyHashable, String>,
    /// Keys whose text has been classified as Harmony (never forwarded as
    /// plain text blocks).
    pub harmony_keys: HashSet<AddressingKeyHashable>,
    /// How many Harmony tool calls have already been turned into blocks, per
    /// key; extraction re-scans the whole buffer, so this is how repeat
    /// scans avoid re-emitting the same call.
    pub harmony_extracted: HashMap<AddressingKeyHashable, usize>,

    pub web_search_emitted: HashSet<String>,

    pub usage: Value,
}

/// `AddressingKey` with `content_index`/`output_index` collapsed to `i64`
/// for hashing once resolved against `last_allocated_index`'s fallback; kept
/// as its own type so callers can't accidentally compare a raw (possibly
/// `None`-bearing) key against the resolved one.
pub type AddressingKeyHashable = (i64, i64, BlockKind);

/* --- start of code -------------------------------------------------------------------------- */

impl StreamState {
    pub fn new(model: impl Into<String>, initial_usage: Value) -> Self {
        Self {
            message_id: format!("msg_{}", Uuid::new_v4().simple()),
            model: model.into(),
            next_block_index: 0,
            keys_to_index: HashMap::new(),
            last_allocated_index: None,
            call_id_to_index: HashMap::new(),
            blocks: HashMap::new(),
            completed_blocks: HashSet::new(),
            message_start_emitted: false,
            message_stop_emitted: false,
            saw_tool_call: false,
            saw_function_call: false,
            harmony_buffers: HashMap::new(),
            harmony_keys: HashSet::new(),
            harmony_extracted: HashMap::new(),
            web_search_emitted: HashSet::new(),
            usage: initial_usage,
        }
    }

    /// Resolves an [`AddressingKey`] to a concrete, hashable key: missing
    /// indices default to `-1` so frames that genuinely omit both indices
    /// (single-block providers) collapse onto one slot per `kind`.
    fn resolve_key(key: &AddressingKey) -> AddressingKeyHashable {
        (key.output_index.unwrap_or(-1), key.content_index.unwrap_or(-1), key.kind)
    }

    /// Looks up the block index for `key`, allocating a fresh one (in
    /// emission order, dense, monotonic; invariant 2) the first time it is
    /// seen. A frame with no index fields at all inherits the most recently
    /// allocated index, per `spec.md` §4.3's "Block-indexing rule".
    pub fn index_for(&mut self, key: &AddressingKey) -> usize {
        if key.output_index.is_none() && key.content_index.is_none() {
            if let Some(last) = self.last_allocated_index {
                return last;
            }
        }

        let resolved = Self::resolve_key(key);
        if let Some(&index) = self.keys_to_index.get(&resolved) {
            return index;
        }

        let index = self.next_block_index;
        self.next_block_index += 1;
        self.keys_to_index.insert(resolved, index);
        self.last_allocated_index = Some(index);
        index
    }

    pub fn scratch_mut(&mut self, index: usize) -> &mut BlockScratch {
        self.blocks.entry(index).or_default()
    }

    pub fn is_started(&self, index: usize) -> bool {
        self.blocks.get(&index).map(|b| b.started).unwrap_or(false)
    }

    /// Allocates a new block index unconditionally, bypassing the
    /// addressing-key map. Used for Harmony tool-call blocks, each of which
    /// is synthesized exactly once and never looked up again.
    pub fn allocate_fresh_index(&mut self) -> usize {
        let index = self.next_block_index;
        self.next_block_index += 1;
        self.last_allocated_index = Some(index);
        index
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.completed_blocks.contains(&index)
    }

    pub fn mark_completed(&mut self, index: usize) {
        self.completed_blocks.insert(index);
        if let Some(scratch) = self.blocks.get_mut(&index) {
            scratch.completed = true;
        }
    }

    pub fn harmony_key(key: &AddressingKey) -> AddressingKeyHashable {
        Self::resolve_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(output: Option<i64>, content: Option<i64>, kind: BlockKind) -> AddressingKey {
        AddressingKey { output_index: output, content_index: content, kind }
    }

    #[test]
    fn block_indices_are_dense_and_monotonic() {
        let mut state = StreamState::new("gpt-5.2", Value::Null);
        let a = state.index_for(&key(Some(0), Some(0), BlockKind::Text));
        let b = state.index_for(&key(Some(0), Some(1), BlockKind::Text));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn same_key_reuses_the_same_index() {
        let mut state = StreamState::new("gpt-5.2", Value::Null);
        let first = state.index_for(&key(Some(1), Some(0), BlockKind::ToolUse));
        let second = state.index_for(&key(Some(1), Some(0), BlockKind::ToolUse));
        assert_eq!(first, second);
    }

    #[test]
    fn indexless_frame_inherits_last_allocated_index() {
        let mut state = StreamState::new("gpt-5.2", Value::Null);
        let allocated = state.index_for(&key(Some(0), Some(0), BlockKind::Text));
        let inherited = state.index_for(&key(None, None, BlockKind::Text));
        assert_eq!(allocated, inherited);
    }
}
