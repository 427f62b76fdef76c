use std::collections::BTreeMap;

use crate::error::PreconditionError;
use crate::WbResult;

/// Word-addressed backing memory of a device model.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Store {
    words: BTreeMap<u64, u64>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    /// Creates or overwrites the word at `address`.
    pub fn write(&mut self, address: u64, data: u64) {
        self.words.insert(address, data);
    }

    pub fn read(&self, address: u64) -> WbResult<u64> {
        self.words
            .get(&address)
            .copied()
            .ok_or_else(|| PreconditionError::UnwrittenAddress { address }.into())
    }

    pub fn preload(&mut self, words: impl IntoIterator<Item = (u64, u64)>) {
        self.words.extend(words);
    }

    pub fn contains(&self, address: u64) -> bool {
        self.words.contains_key(&address)
    }

    /// Entries in address order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.words.iter().map(|(&a, &d)| (a, d))
    }

    pub fn snapshot(&self) -> BTreeMap<u64, u64> {
        self.words.clone()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
