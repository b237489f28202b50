//! Bounded dedup window with in-flight claims
//!
//! An id is either unseen, pending (a delivery is being handled right now)
//! or seen (handled successfully). Claims are released on drop unless
//! committed, so a failed or cancelled delivery can be redelivered.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct WindowState {
    seen: HashSet<String>,
    /// Insertion order of `seen`, oldest first
    order: VecDeque<String>,
    pending: HashSet<String>,
}

/// Recently handled event ids, oldest evicted first
#[derive(Debug)]
pub struct DedupWindow {
    capacity: usize,
    state: Mutex<WindowState>,
}

impl DedupWindow {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity, state: Mutex::new(WindowState::default()) }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Claim `id` for handling; `None` when it is seen or pending
    #[must_use]
    pub fn try_claim(&self, id: &str) -> Option<Claim<'_>> {
        let mut state = self.state.lock();
        if state.seen.contains(id) || state.pending.contains(id) {
            return None;
        }
        state.pending.insert(id.to_string());
        Some(Claim { window: self, id: id.to_string(), committed: false })
    }

    #[must_use]
    pub fn is_seen(&self, id: &str) -> bool {
        self.state.lock().seen.contains(id)
    }

    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.state.lock().pending.contains(id)
    }

    /// Number of seen ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn promote(&self, id: &str) {
        let mut state = self.state.lock();
        state.pending.remove(id);
        if state.seen.insert(id.to_string()) {
            state.order.push_back(id.to_string());
        }
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.seen.remove(&oldest);
            }
        }
    }

    fn release(&self, id: &str) {
        self.state.lock().pending.remove(id);
    }
}

/// Exclusive right to handle one event id
#[derive(Debug)]
#[must_use = "dropping a claim releases it"]
pub struct Claim<'a> {
    window: &'a DedupWindow,
    id: String,
    committed: bool,
}

impl Claim<'_> {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Mark the id as handled
    pub fn commit(mut self) {
        self.committed = true;
        self.window.promote(&self.id);
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.window.release(&self.id);
        }
    }
}
