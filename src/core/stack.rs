//! Evaluation stack.
//!
//! Slot 0 is a permanent `NONE` base item. Popping never removes it, so an
//! operator that reads past the bottom sees `NONE` instead of faulting.

use std::fmt;

use super::item::StackItem;

/// Typed operand stack for one evaluator.
#[derive(Clone)]
pub struct EvalStack {
    items: Vec<StackItem>,
    capacity: usize,
}

impl EvalStack {
    /// Create a stack sized for `capacity` items above the base slot.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut items = Vec::with_capacity(capacity + 1);
        items.push(StackItem::None);
        Self { items, capacity }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items above the base slot.
    #[inline]
    pub fn depth(&self) -> usize {
        self.items.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.len() == 1
    }

    /// Drop everything down to the base slot.
    #[inline]
    pub fn reset(&mut self) {
        self.items.truncate(1);
        self.items[0] = StackItem::None;
    }

    #[inline]
    pub fn push(&mut self, item: StackItem) {
        self.items.push(item);
    }

    /// Pop the top item; at the base this yields `NONE`.
    #[inline]
    pub fn pop(&mut self) -> StackItem {
        if self.items.len() > 1 {
            self.items.pop().unwrap_or_default()
        } else {
            StackItem::None
        }
    }

    /// Discard `n` items (never the base).
    #[inline]
    pub fn discard(&mut self, n: usize) {
        let keep = self.items.len().saturating_sub(n).max(1);
        self.items.truncate(keep);
    }

    /// Top item, or the base slot when empty.
    #[inline]
    pub fn top(&self) -> StackItem {
        self.items[self.items.len() - 1]
    }

    #[inline]
    pub fn top_mut(&mut self) -> &mut StackItem {
        let last = self.items.len() - 1;
        &mut self.items[last]
    }

    /// Item `n` positions below the top (0 = top).
    #[inline]
    pub fn peek(&self, n: usize) -> StackItem {
        let len = self.items.len();
        if n < len {
            self.items[len - 1 - n]
        } else {
            StackItem::None
        }
    }

    /// Replace the item `n` positions below the top.
    #[inline]
    pub fn set(&mut self, n: usize, item: StackItem) {
        let len = self.items.len();
        if n < len - 1 {
            self.items[len - 1 - n] = item;
        }
    }

    /// The top `n` items in push order (deepest first).
    #[inline]
    pub fn top_slice(&self, n: usize) -> &[StackItem] {
        let len = self.items.len();
        let n = n.min(len - 1);
        &self.items[len - n..]
    }

    /// Pop `n` items, returning them in push order.
    pub fn pop_n(&mut self, n: usize) -> Vec<StackItem> {
        let len = self.items.len();
        let n = n.min(len - 1);
        self.items.split_off(len - n)
    }
}

impl Default for EvalStack {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl fmt::Debug for EvalStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items[1..].iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_basic_operations() {
        let mut stack = EvalStack::with_capacity(8);
        assert!(stack.is_empty());
        stack.push(StackItem::Integer(1));
        stack.push(StackItem::Real(2.0));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.top(), StackItem::Real(2.0));
        assert_eq!(stack.peek(1), StackItem::Integer(1));
        assert_eq!(stack.pop(), StackItem::Real(2.0));
        assert_eq!(stack.pop(), StackItem::Integer(1));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_stack_base_slot_absorbs_underflow() {
        let mut stack = EvalStack::with_capacity(4);
        assert_eq!(stack.pop(), StackItem::None);
        assert_eq!(stack.top(), StackItem::None);
        stack.discard(10);
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.peek(3), StackItem::None);
    }

    #[test]
    fn test_stack_pop_n_preserves_order() {
        let mut stack = EvalStack::with_capacity(8);
        for i in 0..4 {
            stack.push(StackItem::Integer(i));
        }
        let popped = stack.pop_n(3);
        assert_eq!(popped, vec![StackItem::Integer(1), StackItem::Integer(2), StackItem::Integer(3)]);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_stack_reset() {
        let mut stack = EvalStack::with_capacity(8);
        stack.push(StackItem::Integer(7));
        *stack.top_mut() = StackItem::Integer(8);
        assert_eq!(stack.top(), StackItem::Integer(8));
        stack.reset();
        assert!(stack.is_empty());
    }
}
