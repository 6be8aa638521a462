//! Delivery Context
//!
//! Tracks which nodes the current thread is delivering events for.
//!
//! A dispatcher holds its node's publish lock for the whole delivery loop.
//! If a listener then publishes to (or registers on) that same node from
//! inside its callback, the thread would wait on a lock it already holds.
//! Dispatchers consult this context first and refuse such calls instead.
//!
//! # Implementation
//!
//! A thread-local stack of node IDs. Delivering for a node pushes it; the
//! returned guard pops it on drop, including while unwinding out of a
//! panicking listener. The stack nests: a listener of node A may publish to
//! node B, whose listeners then run with both A and B on the stack.
//!
//! Only same-thread re-entrancy is detected. Lock cycles built across
//! threads by listeners that block on each other are not.

use std::cell::RefCell;

use crate::graph::NodeId;

thread_local! {
    static DELIVERY_STACK: RefCell<Vec<NodeId>> = RefCell::new(Vec::new());
}

/// Guard that pops the node when dropped.
pub struct DeliveryContext {
    node: NodeId,
}

impl DeliveryContext {
    /// Mark the current thread as delivering for `node`.
    pub fn enter(node: NodeId) -> Self {
        DELIVERY_STACK.with(|stack| stack.borrow_mut().push(node));
        Self { node }
    }

    /// Whether this thread is inside a delivery for `node`, at any depth.
    pub fn is_delivering(node: NodeId) -> bool {
        DELIVERY_STACK.with(|stack| stack.borrow().contains(&node))
    }

    /// The innermost node being delivered for, if any.
    pub fn current() -> Option<NodeId> {
        DELIVERY_STACK.with(|stack| stack.borrow().last().copied())
    }

    pub fn depth() -> usize {
        DELIVERY_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for DeliveryContext {
    fn drop(&mut self) {
        DELIVERY_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(node) = popped {
                debug_assert_eq!(
                    node, self.node,
                    "DeliveryContext mismatch: expected {:?}, got {:?}",
                    self.node, node
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_node() {
        let node = NodeId::new();

        assert!(!DeliveryContext::is_delivering(node));
        assert!(DeliveryContext::current().is_none());

        {
            let _ctx = DeliveryContext::enter(node);
            assert!(DeliveryContext::is_delivering(node));
            assert_eq!(DeliveryContext::current(), Some(node));
        }

        assert!(!DeliveryContext::is_delivering(node));
        assert_eq!(DeliveryContext::depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let outer = NodeId::new();
        let inner = NodeId::new();

        {
            let _ctx1 = DeliveryContext::enter(outer);
            {
                let _ctx2 = DeliveryContext::enter(inner);
                assert_eq!(DeliveryContext::current(), Some(inner));
                assert!(DeliveryContext::is_delivering(outer));
                assert_eq!(DeliveryContext::depth(), 2);
            }

            assert_eq!(DeliveryContext::current(), Some(outer));
            assert!(!DeliveryContext::is_delivering(inner));
        }

        assert!(DeliveryContext::current().is_none());
    }

    #[test]
    fn context_is_per_thread() {
        let node = NodeId::new();
        let _ctx = DeliveryContext::enter(node);

        let seen_elsewhere = std::thread::spawn(move || DeliveryContext::is_delivering(node))
            .join()
            .unwrap();
        assert!(!seen_elsewhere);
    }

    #[test]
    fn context_pops_during_unwind() {
        let node = NodeId::new();

        let result = std::panic::catch_unwind(|| {
            let _ctx = DeliveryContext::enter(node);
            panic!("listener blew up");
        });

        assert!(result.is_err());
        assert!(!DeliveryContext::is_delivering(node));
    }
}
