//! Per-connection reassembly state, keyed by (source, destination) and kept
//! in most-recently-used order.

use crate::transport::Reassembler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub source: u16,
    pub destination: u16,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub key: ContextKey,
    pub reassembler: Reassembler,
}

impl Context {
    fn new(key: ContextKey, capacity: usize) -> Self {
        Context { key, reassembler: Reassembler::new(capacity) }
    }
}

/// A context pushed out of a full table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evicted {
    pub key: ContextKey,
    /// Undelivered payload bytes the evicted context was holding.
    pub bytes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TableStats {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded context table with move-to-front on every lookup.
#[derive(Debug)]
pub struct ContextTable {
    /// Head is the most recently used entry.
    entries: Vec<Context>,
    max_contexts: usize,
    buffer_capacity: usize,
    pub stats: TableStats,
}

impl ContextTable {
    /// `max_contexts` is clamped to at least one entry.
    pub fn new(max_contexts: usize, buffer_capacity: usize) -> Self {
        let max_contexts = max_contexts.max(1);
        ContextTable {
            entries: Vec::with_capacity(max_contexts.min(1024)),
            max_contexts,
            buffer_capacity,
            stats: TableStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_contexts
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = ContextKey> + '_ {
        self.entries.iter().map(|c| c.key)
    }

    pub fn get(&self, source: u16, destination: u16) -> Option<&Context> {
        let key = ContextKey { source, destination };
        self.entries.iter().find(|c| c.key == key)
    }

    /// Find or create the context for `(source, destination)` and move it to
    /// the head. On a miss with the table full the tail entry is reset,
    /// re-keyed and reused; the eviction is returned so the caller can report
    /// bytes that were dropped.
    pub fn lookup_or_create(&mut self, source: u16, destination: u16) -> (&mut Context, Option<Evicted>) {
        let key = ContextKey { source, destination };
        self.stats.lookups += 1;

        let mut evicted = None;
        match self.entries.iter().position(|c| c.key == key) {
            Some(i) => {
                self.stats.hits += 1;
                self.entries[..=i].rotate_right(1);
            }
            None if self.entries.len() < self.max_contexts => {
                self.stats.misses += 1;
                self.entries.insert(0, Context::new(key, self.buffer_capacity));
            }
            None => {
                self.stats.misses += 1;
                self.stats.evictions += 1;
                let tail = self.entries.len() - 1;
                let victim = &mut self.entries[tail];
                let bytes = victim.reassembler.reset();
                evicted = Some(Evicted { key: victim.key, bytes });
                victim.key = key;
                self.entries.rotate_right(1);
            }
        }
        (&mut self.entries[0], evicted)
    }

    /// Tear down one context. Returns the undelivered bytes it held.
    pub fn remove(&mut self, source: u16, destination: u16) -> Option<usize> {
        let key = ContextKey { source, destination };
        let i = self.entries.iter().position(|c| c.key == key)?;
        let mut ctx = self.entries.remove(i);
        Some(ctx.reassembler.reset())
    }

    /// Tear down every context, returning the ones that still held bytes.
    pub fn clear(&mut self) -> Vec<Evicted> {
        self.entries
            .drain(..)
            .filter_map(|mut ctx| {
                let bytes = ctx.reassembler.reset();
                (bytes > 0).then_some(Evicted { key: ctx.key, bytes })
            })
            .collect()
    }
}
