use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::OrderSide;

/// Entries kept in the bounded id sets before the oldest is evicted
pub const DEFAULT_ID_CAPACITY: usize = 1024;

/// Insertion-ordered set that forgets its oldest entries past a capacity
#[derive(Debug, Clone)]
pub struct BoundedIdSet<V = ()> {
    order: VecDeque<String>,
    members: HashMap<String, V>,
    capacity: usize,
}

impl<V: Copy> BoundedIdSet<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(64)),
            members: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false when the id was already present
    pub fn insert(&mut self, id: &str, value: V) -> bool {
        if self.members.contains_key(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.members.insert(id.to_string(), value);
        true
    }

    pub fn get(&self, id: &str) -> Option<V> {
        self.members.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

/// Ids of this engine's orders, used to dedupe venue pushes and to tell our orders apart
/// from unrelated account activity.
#[derive(Debug, Clone)]
pub struct IdentitySets {
    /// Orders placed and not yet terminal
    placed: HashSet<String>,
    /// Orders we cancelled, with their side, so late fills can still be hedged
    cancelled: BoundedIdSet<OrderSide>,
    /// Trade ids already applied
    trades: BoundedIdSet,
}

impl Default for IdentitySets {
    fn default() -> Self {
        Self::new(DEFAULT_ID_CAPACITY)
    }
}

impl IdentitySets {
    pub fn new(capacity: usize) -> Self {
        Self {
            placed: HashSet::new(),
            cancelled: BoundedIdSet::new(capacity),
            trades: BoundedIdSet::new(capacity),
        }
    }

    pub fn mark_placed(&mut self, order_id: &str) -> bool {
        self.placed.insert(order_id.to_string())
    }

    pub fn is_placed(&self, order_id: &str) -> bool {
        self.placed.contains(order_id)
    }

    /// Placed by this engine and live, or cancelled recently enough to remember
    pub fn is_ours(&self, order_id: &str) -> bool {
        self.is_placed(order_id) || self.cancelled.contains(order_id)
    }

    /// Order reached a terminal state
    pub fn retire(&mut self, order_id: &str) {
        self.placed.remove(order_id);
    }

    pub fn mark_cancelled(&mut self, order_id: &str, side: OrderSide) {
        self.placed.remove(order_id);
        self.cancelled.insert(order_id, side);
    }

    /// Side of a cancelled order still remembered
    pub fn cancelled_side(&self, order_id: &str) -> Option<OrderSide> {
        self.cancelled.get(order_id)
    }

    /// Returns false for a trade id already applied
    pub fn record_trade(&mut self, trade_id: &str) -> bool {
        self.trades.insert(trade_id, ())
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }

    pub fn clear(&mut self) {
        self.placed.clear();
        self.cancelled.clear();
        self.trades.clear();
    }
}
