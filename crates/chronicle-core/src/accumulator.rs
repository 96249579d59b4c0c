use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::VecDeque;

use crate::transcript::EntryBody;
use crate::transcript::EntryId;
use crate::transcript::Transcript;

/// Identifies an in-flight text stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKey {
    /// The single "current assistant message" slot.
    Assistant,
    Reasoning(String),
}

/// Tracks which transcript entry each open stream writes into. The text lives
/// in the entry itself; deltas are appended in place and never deduplicated.
///
/// A stream can be detached (no longer the target of new deltas) while its
/// entry is still marked streaming; `unsettled` remembers those entries so an
/// idle can close every one of them.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    open: HashMap<StreamKey, EntryId>,
    unsettled: BTreeSet<EntryId>,
}

impl StreamAccumulator {
    pub fn open(&mut self, key: StreamKey, entry: EntryId) {
        self.open.insert(key, entry);
        self.unsettled.insert(entry);
    }

    pub fn entry_for(&self, key: &StreamKey) -> Option<EntryId> {
        self.open.get(key).copied()
    }

    /// Append `delta` to the stream's entry and return the accumulated text.
    /// An entry closed by [`close`](Self::close) streams again. `None` when
    /// the stream is not open or its entry is gone.
    pub fn append<'t>(
        &mut self,
        transcript: &'t mut Transcript,
        key: &StreamKey,
        delta: &str,
    ) -> Option<&'t str> {
        let id = self.entry_for(key)?;
        let entry = transcript.get_mut(id)?;
        let content = match &mut entry.body {
            EntryBody::Assistant(assistant) => {
                assistant.streaming = true;
                &mut assistant.content
            }
            EntryBody::Reasoning(reasoning) => {
                reasoning.streaming = true;
                &mut reasoning.content
            }
            _ => return None,
        };
        self.unsettled.insert(id);
        content.push_str(delta);
        Some(content.as_str())
    }

    /// Mark the stream's entry as no longer streaming but keep it as the
    /// target for later deltas.
    pub fn close(&mut self, transcript: &mut Transcript, key: &StreamKey) -> Option<EntryId> {
        let entry = self.entry_for(key)?;
        self.settle(transcript, entry);
        Some(entry)
    }

    /// Close the stream's entry and stop tracking it.
    pub fn finalize(&mut self, transcript: &mut Transcript, key: &StreamKey) -> Option<EntryId> {
        let entry = self.open.remove(key)?;
        self.settle(transcript, entry);
        Some(entry)
    }

    /// Stop tracking the stream without touching its entry.
    pub fn detach(&mut self, key: &StreamKey) -> Option<EntryId> {
        self.open.remove(key)
    }

    /// Close every entry still marked streaming, attached or not, and forget
    /// all streams. Returns the closed entries in transcript order.
    pub fn finalize_all(&mut self, transcript: &mut Transcript) -> Vec<EntryId> {
        self.open.clear();
        let closed: Vec<EntryId> = std::mem::take(&mut self.unsettled).into_iter().collect();
        for &entry in &closed {
            set_streaming(transcript, entry, false);
        }
        closed
    }

    pub fn is_open(&self, key: &StreamKey) -> bool {
        self.open.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.open.clear();
        self.unsettled.clear();
    }

    fn settle(&mut self, transcript: &mut Transcript, entry: EntryId) {
        self.unsettled.remove(&entry);
        set_streaming(transcript, entry, false);
    }
}

fn set_streaming(transcript: &mut Transcript, id: EntryId, streaming: bool) {
    let Some(entry) = transcript.get_mut(id) else {
        return;
    };
    match &mut entry.body {
        EntryBody::Assistant(assistant) => assistant.streaming = streaming,
        EntryBody::Reasoning(reasoning) => reasoning.streaming = streaming,
        _ => {}
    }
}

/// Rolling tail of the most recent assistant text for a live status line.
#[derive(Debug, Clone)]
pub struct PreviewBuffer {
    cap: usize,
    chars: VecDeque<char>,
}

impl PreviewBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            chars: VecDeque::with_capacity(cap),
        }
    }

    pub fn push(&mut self, delta: &str) {
        if self.cap == 0 {
            return;
        }
        for ch in delta.chars() {
            if self.chars.len() == self.cap {
                self.chars.pop_front();
            }
            self.chars.push_back(ch);
        }
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn clear(&mut self) {
        self.chars.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

impl Default for PreviewBuffer {
    fn default() -> Self {
        Self::new(120)
    }
}
