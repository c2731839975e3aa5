use common::{FrameId, ReplacerPolicy};
use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;

/// Eviction-policy module of the buffer pool.
///
/// A replacer tracks the frames whose pin count has dropped to zero and
/// picks among them when the pool needs a victim. `len` reports how many
/// frames are currently evictable.
pub trait Replacer {
    /// Pick and forget an evictable frame, or `None` when every tracked
    /// frame is pinned.
    fn victim(&mut self) -> Option<FrameId>;

    /// The frame was pinned by the pool; stop considering it.
    fn pin(&mut self, frame: FrameId);

    /// The frame's pin count reached zero; it is fair game again.
    fn unpin(&mut self, frame: FrameId);

    /// Number of evictable frames.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the policy selected in the configuration.
pub fn build_replacer(policy: ReplacerPolicy) -> Box<dyn Replacer> {
    match policy {
        ReplacerPolicy::Lru => Box::new(LruReplacer::new()),
        ReplacerPolicy::LruK { k } => Box::new(LruKReplacer::new(k)),
        ReplacerPolicy::Clock => Box::new(ClockReplacer::new()),
    }
}

/// Least-recently-unpinned eviction.
///
/// Keeps evictable frames ordered with the most recently unpinned at the
/// front; victims come off the back.
#[derive(Debug, Default)]
pub struct LruReplacer {
    queue: VecDeque<FrameId>,
    members: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        let frame = self.queue.pop_back()?;
        self.members.remove(&frame);
        Some(frame)
    }

    fn pin(&mut self, frame: FrameId) {
        if self.members.remove(&frame) {
            self.queue.retain(|&f| f != frame);
        }
    }

    fn unpin(&mut self, frame: FrameId) {
        // Idempotent: an already-tracked frame keeps its position.
        if self.members.insert(frame) {
            self.queue.push_front(frame);
        }
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

/// LRU-K eviction.
///
/// Frames with fewer than `k` recorded accesses sit in a history list and
/// are preferred victims; frames that reached `k` accesses live in a cache
/// list and re-enter its front on every further access. Victim selection
/// scans history first, then cache, taking the first evictable frame and
/// clearing its recorded state.
#[derive(Debug)]
pub struct LruKReplacer {
    k: usize,
    access_count: HashMap<FrameId, usize>,
    evictable: HashSet<FrameId>,
    history: VecDeque<FrameId>,
    cache: VecDeque<FrameId>,
}

impl LruKReplacer {
    pub fn new(k: usize) -> Self {
        assert!(k > 0, "lru-k needs k > 0");
        Self {
            k,
            access_count: HashMap::new(),
            evictable: HashSet::new(),
            history: VecDeque::new(),
            cache: VecDeque::new(),
        }
    }

    fn forget(&mut self, frame: FrameId) {
        self.access_count.remove(&frame);
        self.evictable.remove(&frame);
        self.history.retain(|&f| f != frame);
        self.cache.retain(|&f| f != frame);
    }
}

impl Replacer for LruKReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        let pick = self
            .history
            .iter()
            .chain(self.cache.iter())
            .copied()
            .find(|f| self.evictable.contains(f))?;
        self.forget(pick);
        Some(pick)
    }

    fn pin(&mut self, frame: FrameId) {
        if self.access_count.get(&frame).copied().unwrap_or(0) == 0 {
            return;
        }
        self.evictable.remove(&frame);
    }

    fn unpin(&mut self, frame: FrameId) {
        let count = self.access_count.entry(frame).or_insert(0);
        *count += 1;
        let count = *count;
        self.evictable.insert(frame);

        if count == self.k {
            // Graduates from history to the cache front.
            self.history.retain(|&f| f != frame);
            self.cache.push_front(frame);
        } else if count > self.k {
            self.cache.retain(|&f| f != frame);
            self.cache.push_front(frame);
        } else if !self.history.contains(&frame) {
            self.history.push_front(frame);
        }
    }

    fn len(&self) -> usize {
        self.evictable.len()
    }
}

/// Second-chance clock sweep.
///
/// Unpinned frames enter the ring with their reference bit set; the sweep
/// clears set bits and evicts the first frame found with a clear bit.
#[derive(Debug, Default)]
pub struct ClockReplacer {
    ring: VecDeque<(FrameId, bool)>,
}

impl ClockReplacer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Replacer for ClockReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        // Two passes bound the sweep: the first clears reference bits.
        for _ in 0..self.ring.len() * 2 {
            let (frame, referenced) = self.ring.pop_front()?;
            if referenced {
                self.ring.push_back((frame, false));
            } else {
                return Some(frame);
            }
        }
        None
    }

    fn pin(&mut self, frame: FrameId) {
        self.ring.retain(|&(f, _)| f != frame);
    }

    fn unpin(&mut self, frame: FrameId) {
        if self.ring.iter().any(|&(f, _)| f == frame) {
            return;
        }
        self.ring.push_back((frame, true));
    }

    fn len(&self) -> usize {
        self.ring.len()
    }
}
