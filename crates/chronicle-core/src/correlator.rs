use std::collections::HashMap;
use std::collections::HashSet;

use crate::transcript::EntryId;

/// Correlation id → transcript entry for tool calls and subagents.
///
/// Holds no ordering; the transcript owns that. Ids of hidden tool calls are
/// remembered separately so their later patches are dropped quietly instead
/// of being counted as unknown.
#[derive(Debug, Clone, Default)]
pub struct ToolCallCorrelator {
    entries: HashMap<String, EntryId>,
    hidden: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(EntryId),
    Hidden,
    Unknown,
}

impl ToolCallCorrelator {
    /// Registering an id that is already open replaces the older mapping, so
    /// only the most recent entry for a call id is patchable.
    pub fn register(&mut self, call_id: &str, entry: EntryId) -> Option<EntryId> {
        self.hidden.remove(call_id);
        self.entries.insert(call_id.to_string(), entry)
    }

    /// Returns the visible entry the id was open on, if any.
    pub fn register_hidden(&mut self, call_id: &str) -> Option<EntryId> {
        self.hidden.insert(call_id.to_string());
        self.entries.remove(call_id)
    }

    pub fn find(&self, call_id: &str) -> Option<EntryId> {
        self.entries.get(call_id).copied()
    }

    pub fn lookup(&self, call_id: &str) -> Lookup {
        if let Some(entry) = self.find(call_id) {
            Lookup::Found(entry)
        } else if self.hidden.contains(call_id) {
            Lookup::Hidden
        } else {
            Lookup::Unknown
        }
    }

    pub fn forget(&mut self, call_id: &str) -> Option<EntryId> {
        self.hidden.remove(call_id);
        self.entries.remove(call_id)
    }

    pub fn open_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hidden.clear();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn register_find_forget() {
        let mut correlator = ToolCallCorrelator::default();
        assert_eq!(correlator.register("7", EntryId(3)), None);
        assert_eq!(correlator.find("7"), Some(EntryId(3)));
        assert_eq!(correlator.forget("7"), Some(EntryId(3)));
        assert_eq!(correlator.lookup("7"), Lookup::Unknown);
    }

    #[test]
    fn re_registering_points_at_newest_entry() {
        let mut correlator = ToolCallCorrelator::default();
        correlator.register("7", EntryId(1));
        assert_eq!(correlator.register("7", EntryId(4)), Some(EntryId(1)));
        assert_eq!(correlator.lookup("7"), Lookup::Found(EntryId(4)));
    }

    #[test]
    fn hidden_ids_are_distinguished_from_unknown() {
        let mut correlator = ToolCallCorrelator::default();
        correlator.register_hidden("h1");
        assert_eq!(correlator.lookup("h1"), Lookup::Hidden);
        assert_eq!(correlator.lookup("nope"), Lookup::Unknown);
        assert_eq!(correlator.open_count(), 0);
    }
}
