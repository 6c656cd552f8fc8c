//! Collaborator interfaces the dispute engine consumes, plus in-memory
//! implementations used by the binary and the tests.
//!
//! Seal verification, order-cancellation bookkeeping, wallet suspension,
//! historical balance logging, system parameters, and reward custody all
//! live behind these seams; the engine never implements them itself.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::Amount;
use crate::currency::{Address, Currency, Hash, MonetaryFigure};
use crate::model::{BlockNumber, Order, Payment, Trade};

/// Seal/signature verification.
pub trait Validator: Send + Sync {
    fn is_genuine_order_wallet_seal(&self, order: &Order) -> bool;
    fn is_genuine_order_exchange_seal(&self, order: &Order) -> bool;
    fn is_genuine_trade_seal(&self, trade: &Trade) -> bool;
    fn is_genuine_payment_seals(&self, payment: &Payment) -> bool;

    /// Both order seals, each verified independently.
    fn is_genuine_order_seals(&self, order: &Order) -> bool {
        self.is_genuine_order_wallet_seal(order) && self.is_genuine_order_exchange_seal(order)
    }
}

/// Order-cancellation bookkeeping; mutated elsewhere, read-only here.
pub trait CancelOrdersChallenge: Send + Sync {
    fn is_order_cancelled(&self, order_hash: &Hash) -> bool;
}

/// Wallet suspension.
pub trait WalletLocker: Send + Sync {
    fn is_locked(&self, wallet: &Address) -> bool;
}

/// Which logged balance of a wallet a tracker query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalanceType {
    Deposited,
    Settled,
    Staged,
}

/// One entry of a wallet's balance log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceLog {
    pub amount: Amount,
    pub block_number: BlockNumber,
}

/// Time-indexed balance log per wallet, currency, and balance type.
pub trait BalanceTracker: Send + Sync {
    /// The last log entry at or before `block`, if any.
    fn last_logged_balance(
        &self,
        wallet: &Address,
        currency: &Currency,
        balance_type: BalanceType,
        block: BlockNumber,
    ) -> Option<BalanceLog>;
}

/// System parameters.
pub trait Configuration: Send + Sync {
    /// Challenge window length in blocks for driips in `currency`.
    fn challenge_timeout(&self, currency: &Currency) -> u64;

    /// No challenge may start before this block.
    fn earliest_settlement_block_number(&self) -> BlockNumber;

    /// The fixed reward staged on a successful unchallenge.
    fn unchallenge_order_candidate_by_trade_stake(&self) -> MonetaryFigure;
}

/// Reward custody; `stage` credits a figure to a wallet.
pub trait SecurityBond: Send + Sync {
    fn stage(&self, wallet: &Address, currency: &Currency, amount: Amount);
}

/// The collaborator bundle an engine is constructed over.
pub struct Collaborators {
    pub validator: std::sync::Arc<dyn Validator>,
    pub cancel_orders: std::sync::Arc<dyn CancelOrdersChallenge>,
    pub wallet_locker: std::sync::Arc<dyn WalletLocker>,
    pub balance_tracker: std::sync::Arc<dyn BalanceTracker>,
    pub configuration: std::sync::Arc<dyn Configuration>,
    pub security_bond: std::sync::Arc<dyn SecurityBond>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            validator: std::sync::Arc::new(StaticValidator::default()),
            cancel_orders: std::sync::Arc::new(OrderCancellationLedger::default()),
            wallet_locker: std::sync::Arc::new(StaticWalletLocker::default()),
            balance_tracker: std::sync::Arc::new(InMemoryBalanceTracker::default()),
            configuration: std::sync::Arc::new(StaticConfiguration::default()),
            security_bond: std::sync::Arc::new(RecordingSecurityBond::default()),
        }
    }
}

/// Validator with toggleable outcomes. Every seal verifies until a toggle
/// flips; real cryptographic verification lives outside this crate.
#[derive(Debug)]
pub struct StaticValidator {
    order_wallet_seal: AtomicBool,
    order_exchange_seal: AtomicBool,
    trade_seal: AtomicBool,
    payment_seals: AtomicBool,
}

impl Default for StaticValidator {
    fn default() -> Self {
        Self {
            order_wallet_seal: AtomicBool::new(true),
            order_exchange_seal: AtomicBool::new(true),
            trade_seal: AtomicBool::new(true),
            payment_seals: AtomicBool::new(true),
        }
    }
}

impl StaticValidator {
    pub fn set_order_wallet_seal(&self, genuine: bool) {
        self.order_wallet_seal.store(genuine, Ordering::Relaxed);
    }

    pub fn set_order_exchange_seal(&self, genuine: bool) {
        self.order_exchange_seal.store(genuine, Ordering::Relaxed);
    }

    pub fn set_order_seals(&self, genuine: bool) {
        self.set_order_wallet_seal(genuine);
        self.set_order_exchange_seal(genuine);
    }

    pub fn set_trade_seal(&self, genuine: bool) {
        self.trade_seal.store(genuine, Ordering::Relaxed);
    }

    pub fn set_payment_seals(&self, genuine: bool) {
        self.payment_seals.store(genuine, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.set_order_seals(true);
        self.set_trade_seal(true);
        self.set_payment_seals(true);
    }
}

impl Validator for StaticValidator {
    fn is_genuine_order_wallet_seal(&self, _order: &Order) -> bool {
        self.order_wallet_seal.load(Ordering::Relaxed)
    }

    fn is_genuine_order_exchange_seal(&self, _order: &Order) -> bool {
        self.order_exchange_seal.load(Ordering::Relaxed)
    }

    fn is_genuine_trade_seal(&self, _trade: &Trade) -> bool {
        self.trade_seal.load(Ordering::Relaxed)
    }

    fn is_genuine_payment_seals(&self, _payment: &Payment) -> bool {
        self.payment_seals.load(Ordering::Relaxed)
    }
}

/// Set of cancelled order hashes.
#[derive(Debug, Default)]
pub struct OrderCancellationLedger {
    cancelled: Mutex<HashSet<Hash>>,
}

impl OrderCancellationLedger {
    pub fn cancel(&self, order_hash: Hash) {
        self.cancelled.lock().expect("lock poisoned").insert(order_hash);
    }
}

impl CancelOrdersChallenge for OrderCancellationLedger {
    fn is_order_cancelled(&self, order_hash: &Hash) -> bool {
        self.cancelled.lock().expect("lock poisoned").contains(order_hash)
    }
}

/// Lock set keyed by wallet.
#[derive(Debug, Default)]
pub struct StaticWalletLocker {
    locked: Mutex<HashSet<Address>>,
}

impl StaticWalletLocker {
    pub fn lock_wallet(&self, wallet: Address) {
        self.locked.lock().expect("lock poisoned").insert(wallet);
    }

    pub fn unlock_wallet(&self, wallet: &Address) {
        self.locked.lock().expect("lock poisoned").remove(wallet);
    }
}

impl WalletLocker for StaticWalletLocker {
    fn is_locked(&self, wallet: &Address) -> bool {
        self.locked.lock().expect("lock poisoned").contains(wallet)
    }
}

/// Balance log over appended entries, queried by last-at-or-before block.
#[derive(Debug, Default)]
pub struct InMemoryBalanceTracker {
    logs: Mutex<HashMap<(Address, Currency, BalanceType), Vec<BalanceLog>>>,
}

impl InMemoryBalanceTracker {
    pub fn add_log(
        &self,
        wallet: Address,
        currency: Currency,
        balance_type: BalanceType,
        amount: Amount,
        block_number: BlockNumber,
    ) {
        self.logs
            .lock()
            .expect("lock poisoned")
            .entry((wallet, currency, balance_type))
            .or_default()
            .push(BalanceLog {
                amount,
                block_number,
            });
    }
}

impl BalanceTracker for InMemoryBalanceTracker {
    fn last_logged_balance(
        &self,
        wallet: &Address,
        currency: &Currency,
        balance_type: BalanceType,
        block: BlockNumber,
    ) -> Option<BalanceLog> {
        let logs = self.logs.lock().expect("lock poisoned");
        let entries = logs.get(&(*wallet, *currency, balance_type))?;
        entries
            .iter()
            .rev()
            .find(|log| log.block_number <= block)
            .copied()
    }
}

/// Fixed-value configuration with setters, plus per-currency timeout
/// overrides.
#[derive(Debug)]
pub struct StaticConfiguration {
    default_timeout: AtomicU64,
    timeouts: Mutex<HashMap<Currency, u64>>,
    earliest_settlement_block: AtomicU64,
    stake: Mutex<MonetaryFigure>,
}

impl Default for StaticConfiguration {
    fn default() -> Self {
        Self {
            default_timeout: AtomicU64::new(100),
            timeouts: Mutex::new(HashMap::new()),
            earliest_settlement_block: AtomicU64::new(0),
            stake: Mutex::new(MonetaryFigure {
                amount: Amount::from_scaled(1000),
                currency: Currency::BASE,
            }),
        }
    }
}

impl StaticConfiguration {
    pub fn set_challenge_timeout(&self, blocks: u64) {
        self.default_timeout.store(blocks, Ordering::Relaxed);
    }

    pub fn set_challenge_timeout_for(&self, currency: Currency, blocks: u64) {
        self.timeouts
            .lock()
            .expect("lock poisoned")
            .insert(currency, blocks);
    }

    pub fn set_earliest_settlement_block_number(&self, block: BlockNumber) {
        self.earliest_settlement_block.store(block, Ordering::Relaxed);
    }

    pub fn set_unchallenge_order_candidate_by_trade_stake(&self, stake: MonetaryFigure) {
        *self.stake.lock().expect("lock poisoned") = stake;
    }
}

impl Configuration for StaticConfiguration {
    fn challenge_timeout(&self, currency: &Currency) -> u64 {
        self.timeouts
            .lock()
            .expect("lock poisoned")
            .get(currency)
            .copied()
            .unwrap_or_else(|| self.default_timeout.load(Ordering::Relaxed))
    }

    fn earliest_settlement_block_number(&self) -> BlockNumber {
        self.earliest_settlement_block.load(Ordering::Relaxed)
    }

    fn unchallenge_order_candidate_by_trade_stake(&self) -> MonetaryFigure {
        *self.stake.lock().expect("lock poisoned")
    }
}

/// A staged reward recorded by [`RecordingSecurityBond`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedAmount {
    pub wallet: Address,
    pub currency: Currency,
    pub amount: Amount,
}

/// Security bond that records staged rewards instead of moving value.
#[derive(Debug, Default)]
pub struct RecordingSecurityBond {
    stages: Mutex<Vec<StagedAmount>>,
}

impl RecordingSecurityBond {
    pub fn stages(&self) -> Vec<StagedAmount> {
        self.stages.lock().expect("lock poisoned").clone()
    }
}

impl SecurityBond for RecordingSecurityBond {
    fn stage(&self, wallet: &Address, currency: &Currency, amount: Amount) {
        self.stages.lock().expect("lock poisoned").push(StagedAmount {
            wallet: *wallet,
            currency: *currency,
            amount,
        });
    }
}
