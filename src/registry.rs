//! Append-only registries of submitted candidate driips.
//!
//! Candidates are never removed or reordered, so an index handed out at
//! insertion stays valid for the lifetime of the engine.

use crate::model::{Order, Payment, Trade};

/// The three parallel candidate logs. An admitted candidate's index is the
/// registry count minus one at insertion time.
#[derive(Debug, Default)]
pub struct CandidateRegistry {
    orders: Vec<Order>,
    trades: Vec<Trade>,
    payments: Vec<Payment>,
}

impl CandidateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order candidate, returning its index.
    pub fn add_order(&mut self, order: Order) -> u64 {
        self.orders.push(order);
        self.orders.len() as u64 - 1
    }

    /// Append a trade candidate, returning its index.
    pub fn add_trade(&mut self, trade: Trade) -> u64 {
        self.trades.push(trade);
        self.trades.len() as u64 - 1
    }

    /// Append a payment candidate, returning its index.
    pub fn add_payment(&mut self, payment: Payment) -> u64 {
        self.payments.push(payment);
        self.payments.len() as u64 - 1
    }

    pub fn orders_count(&self) -> u64 {
        self.orders.len() as u64
    }

    pub fn trades_count(&self) -> u64 {
        self.trades.len() as u64
    }

    pub fn payments_count(&self) -> u64 {
        self.payments.len() as u64
    }

    pub fn order(&self, index: u64) -> Option<&Order> {
        self.orders.get(index as usize)
    }

    pub fn trade(&self, index: u64) -> Option<&Trade> {
        self.trades.get(index as usize)
    }

    pub fn payment(&self, index: u64) -> Option<&Payment> {
        self.payments.get(index as usize)
    }
}
