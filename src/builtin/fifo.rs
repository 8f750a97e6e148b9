use log::warn;

/// One chained result: the 24-bit value plus its zero and negative flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainWord {
    pub value: i32,
    pub zero: bool,
    pub negative: bool,
}

impl ChainWord {
    pub fn new(value: i32, zero: bool, negative: bool) -> Self {
        Self { value, zero, negative }
    }
}

/// Bounded lane output FIFO with staged updates. A pop hands out the head and
/// marks it for removal; a push is held back. Both are applied on `update`,
/// pop first, so repeated pops in one cycle see the same head.
#[derive(Debug, Clone)]
pub struct ChainFifo {
    entries: std::collections::VecDeque<ChainWord>,
    depth: usize,
    pending_pop: bool,
    pending_push: Option<ChainWord>,
}

impl Default for ChainFifo {
    fn default() -> Self {
        Self::new(Self::DEPTH)
    }
}

impl ChainFifo {
    pub const DEPTH: usize = 2;

    pub fn new(depth: usize) -> Self {
        Self {
            entries: Default::default(),
            depth,
            pending_pop: false,
            pending_push: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.depth
    }

    /// pops staged in the same cycle do not make room
    pub fn is_fillable(&self) -> bool {
        !self.is_full()
    }

    pub fn pop(&mut self) -> ChainWord {
        match self.entries.front() {
            Some(word) => {
                self.pending_pop = true;
                *word
            }
            None => {
                warn!("pop on empty chain fifo");
                ChainWord::default()
            }
        }
    }

    pub fn push(&mut self, word: ChainWord) {
        self.pending_push = Some(word);
    }

    pub fn update(&mut self) {
        if std::mem::take(&mut self.pending_pop) {
            self.entries.pop_front();
        }
        if let Some(word) = self.pending_push.take() {
            if self.is_full() {
                warn!("push on full chain fifo dropped {:#x}", word.value);
            } else {
                self.entries.push_back(word);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending_pop = false;
        self.pending_push = None;
    }
}
