// dictionary.rs - Word registry: name → generated callable

use cranelift_module::FuncId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Defined(FuncId),
    /// Forward declaration made by `recursive` while the body is parsed.
    /// Keeps the definition it hides so a failed parse can put it back.
    Provisional { shadowed: Option<FuncId> },
}

#[derive(Debug, Default)]
pub struct WordRegistry {
    entries: HashMap<String, Entry>,
}

impl WordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for defined and provisionally declared words alike.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Callable bound to `name`. Provisional entries have none yet.
    pub fn lookup(&self, name: &str) -> Option<FuncId> {
        match self.entries.get(name) {
            Some(Entry::Defined(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn declare_provisional(&mut self, name: &str) {
        let shadowed = self.lookup(name).or_else(|| self.shadowed(name));
        self.entries
            .insert(name.to_string(), Entry::Provisional { shadowed });
    }

    /// Drop a provisional declaration, restoring what it shadowed.
    /// Returns false if `name` was not provisional.
    pub fn revoke_provisional(&mut self, name: &str) -> bool {
        match self.entries.get(name) {
            Some(Entry::Provisional { shadowed }) => {
                let shadowed = *shadowed;
                self.restore(name, shadowed);
                true
            }
            _ => false,
        }
    }

    /// Revoke every provisional declaration still pending. Between units
    /// there are none unless the unit that made them was discarded.
    pub fn revoke_all_provisional(&mut self) -> Vec<String> {
        let pending: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Provisional { .. }))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &pending {
            self.revoke_provisional(name);
        }
        pending
    }

    /// Bind `name` to `id`, returning the callable it was bound to before
    /// (looking through a provisional declaration).
    pub fn bind(&mut self, name: &str, id: FuncId) -> Option<FuncId> {
        let previous = match self.entries.get(name) {
            Some(Entry::Defined(old)) => Some(*old),
            Some(Entry::Provisional { shadowed }) => *shadowed,
            None => None,
        };
        self.entries.insert(name.to_string(), Entry::Defined(id));
        previous
    }

    /// Undo a `bind`: put `previous` back, or forget the name.
    pub fn restore(&mut self, name: &str, previous: Option<FuncId>) {
        match previous {
            Some(id) => {
                self.entries.insert(name.to_string(), Entry::Defined(id));
            }
            None => {
                self.entries.remove(name);
            }
        }
    }

    /// Sorted names of every callable word.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Defined(_)))
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn shadowed(&self, name: &str) -> Option<FuncId> {
        match self.entries.get(name) {
            Some(Entry::Provisional { shadowed }) => *shadowed,
            _ => None,
        }
    }
}
