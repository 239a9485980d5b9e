// stack.rs - Backtracking storage.
// DataStack: growable typed stack for mark snapshots and continuation frames.
// RepeatPool: Vec-backed free-index pool of REPEAT context records.

use std::ops::{Index, IndexMut};

use crate::error::EngineError;

// ============================================================================
// DataStack
// ============================================================================

/// Initial capacity reserved on first use.
const INIT_STACK_SIZE: usize = 160;

/// A growable stack with an optional entry limit.
///
/// Growth is geometric: when more room is needed the capacity becomes
/// `needed + needed / 4 + 1024`. A failed reservation reports
/// [`EngineError::Memory`]; exceeding `limit` (0 = unlimited) reports
/// [`EngineError::RecursionLimit`]. Entries are addressed by index, so
/// growth never invalidates a saved position.
#[derive(Debug, Clone)]
pub(crate) struct DataStack<T> {
    items: Vec<T>,
    limit: usize,
}

impl<T: Copy> DataStack<T> {
    pub fn new(limit: usize) -> Self {
        DataStack {
            items: Vec::new(),
            limit,
        }
    }

    /// Make room for `additional` more entries.
    pub fn ensure(&mut self, additional: usize) -> Result<(), EngineError> {
        let needed = self
            .items
            .len()
            .checked_add(additional)
            .ok_or(EngineError::Memory)?;
        if self.limit != 0 && needed > self.limit {
            return Err(EngineError::RecursionLimit);
        }
        if needed > self.items.capacity() {
            let target = if self.items.capacity() == 0 {
                needed.max(INIT_STACK_SIZE)
            } else {
                needed + needed / 4 + 1024
            };
            self.items
                .try_reserve_exact(target - self.items.len())
                .map_err(|_| EngineError::Memory)?;
        }
        Ok(())
    }

    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), EngineError> {
        self.ensure(1)?;
        self.items.push(item);
        Ok(())
    }

    pub fn push_slice(&mut self, items: &[T]) -> Result<(), EngineError> {
        self.ensure(items.len())?;
        self.items.extend_from_slice(items);
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Copy the top `dst.len()` entries into `dst`, consuming them when
    /// `discard` is set and leaving them in place otherwise.
    pub fn pop_into(&mut self, dst: &mut [T], discard: bool) {
        let n = dst.len().min(self.items.len());
        let base = self.items.len() - n;
        dst[..n].copy_from_slice(&self.items[base..]);
        if discard {
            self.items.truncate(base);
        }
    }

    /// Drop the top `n` entries.
    pub fn discard(&mut self, n: usize) {
        let len = self.items.len().saturating_sub(n);
        self.items.truncate(len);
    }

    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Empty the stack, keeping its buffer.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Empty the stack and give its buffer back.
    pub fn release(&mut self) {
        self.items = Vec::new();
    }
}

// ============================================================================
// Repeat contexts
// ============================================================================

pub(crate) type RepeatId = usize;

/// Bookkeeping for one active REPEAT / POSSESSIVE_REPEAT loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RepeatRecord {
    /// Completed iterations; -1 before the first.
    pub count: isize,
    /// Index of the REPEAT skip word, `None` for possessive loops.
    pub pattern: Option<usize>,
    /// Enclosing repeat context.
    pub prev: Option<RepeatId>,
    /// Input position where the last iteration started.
    pub last_ptr: Option<usize>,
}

/// Free-index pool of [`RepeatRecord`]s.
#[derive(Debug, Clone, Default)]
pub(crate) struct RepeatPool {
    slots: Vec<RepeatRecord>,
    free: Vec<RepeatId>,
}

impl RepeatPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, record: RepeatRecord) -> Result<RepeatId, EngineError> {
        if let Some(id) = self.free.pop() {
            self.slots[id] = record;
            return Ok(id);
        }
        self.slots.try_reserve(1).map_err(|_| EngineError::Memory)?;
        // Every slot can end up on the free list at once.
        self.free
            .try_reserve(self.slots.len() + 1 - self.free.len())
            .map_err(|_| EngineError::Memory)?;
        self.slots.push(record);
        Ok(self.slots.len() - 1)
    }

    pub fn release(&mut self, id: RepeatId) {
        debug_assert!(id < self.slots.len());
        self.free.push(id);
    }

    /// Records currently handed out.
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn clear(&mut self) {
        self.slots = Vec::new();
        self.free = Vec::new();
    }
}

impl Index<RepeatId> for RepeatPool {
    type Output = RepeatRecord;

    fn index(&self, id: RepeatId) -> &RepeatRecord {
        &self.slots[id]
    }
}

impl IndexMut<RepeatId> for RepeatPool {
    fn index_mut(&mut self, id: RepeatId) -> &mut RepeatRecord {
        &mut self.slots[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(count: isize) -> RepeatRecord {
        RepeatRecord {
            count,
            pattern: Some(0),
            prev: None,
            last_ptr: None,
        }
    }

    #[test]
    fn push_pop_keep_and_discard() {
        let mut stack: DataStack<Option<usize>> = DataStack::new(0);
        stack.push_slice(&[Some(1), None, Some(3)]).unwrap();
        let mut dst = [None; 2];
        stack.pop_into(&mut dst, false);
        assert_eq!(dst, [None, Some(3)]);
        assert_eq!(stack.len(), 3);
        stack.pop_into(&mut dst, true);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.pop(), Some(Some(1)));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn growth_is_geometric() {
        let mut stack: DataStack<u32> = DataStack::new(0);
        stack.push(1).unwrap();
        assert!(stack.items.capacity() >= INIT_STACK_SIZE);
        let n = stack.items.capacity() + 1;
        for i in 0..n as u32 {
            stack.push(i).unwrap();
        }
        assert!(stack.items.capacity() >= n + n / 4 + 1024);
    }

    #[test]
    fn limit_reports_recursion_limit() {
        let mut stack: DataStack<u32> = DataStack::new(2);
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.push(3), Err(EngineError::RecursionLimit));
        stack.discard(1);
        assert!(stack.push(3).is_ok());
    }

    #[test]
    fn pool_reuses_released_slots() {
        let mut pool = RepeatPool::new();
        let a = pool.acquire(record(-1)).unwrap();
        let b = pool.acquire(record(-1)).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.in_use(), 2);
        pool[b].count = 4;
        pool.release(b);
        assert_eq!(pool.in_use(), 1);
        let c = pool.acquire(record(7)).unwrap();
        assert_eq!(c, b);
        assert_eq!(pool[c].count, 7);
        pool.clear();
        assert_eq!(pool.in_use(), 0);
    }
}
