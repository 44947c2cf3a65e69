/// A dense reusable identifier allocator.
///
/// A `BitSet` hands out small integer ids and lets them be returned for
/// reuse. Allocation prefers the lowest clear bit, or a caller-supplied
/// hint when that slot is free, which keeps ids dense and stable enough to
/// be readable in debug output.
///
/// The set grows on demand and never shrinks; one machine worth of
/// coroutine ids stays within a handful of 64-bit words.
pub(crate) struct BitSet {
    /// Bit storage; bit `i` set means id `i` is allocated.
    words: Vec<u64>,
}

const BITS: usize = u64::BITS as usize;

impl BitSet {
    /// Creates an empty set.
    pub(crate) fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Allocates the lowest free id.
    pub(crate) fn allocate(&mut self) -> usize {
        for (w, word) in self.words.iter_mut().enumerate() {
            if *word != u64::MAX {
                let bit = word.trailing_ones() as usize;
                *word |= 1 << bit;
                return w * BITS + bit;
            }
        }

        self.words.push(1);
        (self.words.len() - 1) * BITS
    }

    /// Allocates `hint` when it is free, otherwise the lowest free id.
    pub(crate) fn allocate_hint(&mut self, hint: usize) -> usize {
        if !self.contains(hint) {
            self.insert(hint);
            return hint;
        }

        self.allocate()
    }

    /// Returns an id to the pool.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently allocated.
    pub(crate) fn free(&mut self, id: usize) {
        assert!(self.contains(id), "freeing an unallocated id");

        self.words[id / BITS] &= !(1 << (id % BITS));
    }

    /// Whether `id` is currently allocated.
    pub(crate) fn contains(&self, id: usize) -> bool {
        self.words
            .get(id / BITS)
            .is_some_and(|word| word & (1 << (id % BITS)) != 0)
    }

    fn insert(&mut self, id: usize) {
        let word = id / BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }

        self.words[word] |= 1 << (id % BITS);
    }
}
