//! Content-addressed cache of generated narration payloads.

use std::collections::{HashMap, VecDeque};

use sha2::{Digest, Sha256};

/// SHA-256 of a `(text, voice)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn new(text: &str, voice: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        // Separator so ("ab", "c") and ("a", "bc") differ.
        hasher.update([0u8]);
        hasher.update(voice.as_bytes());
        Self(hasher.finalize().into())
    }
}

/// Bounded map from [`CacheKey`] to a base64 payload. Evicts oldest first.
#[derive(Debug)]
pub struct VoiceCache {
    capacity: usize,
    entries: HashMap<CacheKey, String>,
    order: VecDeque<CacheKey>,
}

impl VoiceCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: CacheKey, payload: String) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key, payload).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            log::debug!("voice cache cleared ({} entries)", self.entries.len());
        }
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
