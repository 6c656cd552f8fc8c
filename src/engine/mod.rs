//! Settlement-challenge dispute engine.
//!
//! The engine holds per-wallet challenge records, the candidate
//! registries, and the protocol event log, and applies operations on top
//! of them. Every operation either fully commits or is rejected with no
//! state change. Also supports an async stream of replay steps.

use std::collections::HashMap;

use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::Amount;
use crate::collab::{BalanceType, Collaborators};
use crate::currency::{Address, Currency};
use crate::model::{BlockNumber, Nonce, Operation, Order, Payment, Step, Trade};
use crate::registry::CandidateRegistry;

mod error;
mod state;

pub use error::{
    AuthenticityError, AuthorizationError, EngineError, EvidenceInsufficientError,
    OperationalGateError, ReferenceMismatchError, StateConflictError,
};
pub use state::{CandidateType, ChallengeRecord, ChallengeResult, ChallengedDriip, Phase};

/// A protocol event appended on every successful state transition. The
/// most recent matching event reflects the latest successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartChallengeFromTrade {
        wallet: Address,
        nonce: Nonce,
    },
    StartChallengeFromPayment {
        wallet: Address,
        nonce: Nonce,
    },
    ChallengeByOrder {
        wallet: Address,
        candidate_index: u64,
        challenger: Address,
    },
    ChallengeByTrade {
        wallet: Address,
        candidate_index: u64,
        challenger: Address,
    },
    ChallengeByPayment {
        wallet: Address,
        candidate_index: u64,
        challenger: Address,
    },
    UnchallengeOrderCandidateByTrade {
        wallet: Address,
        challenger: Address,
    },
}

/// The settlement-challenge engine.
///
/// Maintains per-wallet challenge histories, the challenged-driip
/// histories they reference, and the candidate registries.
pub struct Engine {
    operator: Address,
    block_number: BlockNumber,
    /// Per-wallet challenge histories; the last entry is the current
    /// challenge. Records are never deleted.
    challenges: HashMap<Address, Vec<ChallengeRecord>>,
    /// Per-wallet histories of the trades challenges were started from.
    challenged_trades: HashMap<Address, Vec<Trade>>,
    /// Per-wallet histories of the payments challenges were started from.
    challenged_payments: HashMap<Address, Vec<Payment>>,
    candidates: CandidateRegistry,
    events: Vec<Event>,
    collab: Collaborators,
}

/// Public API
impl Engine {
    pub fn new(operator: Address) -> Self {
        Self::with_collaborators(operator, Collaborators::default())
    }

    pub fn with_collaborators(operator: Address, collab: Collaborators) -> Self {
        Self {
            operator,
            block_number: 0,
            challenges: HashMap::new(),
            challenged_trades: HashMap::new(),
            challenged_payments: HashMap::new(),
            candidates: CandidateRegistry::new(),
            events: Vec::new(),
            collab,
        }
    }

    /// Run the engine over the given step stream.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Step> + Unpin) {
        while let Some(step) = stream.next().await {
            // a rejected operation should not stop the replay
            let _ = self.apply_step(step);
        }
    }

    /// Apply one replay step: a block-height advance or an operation.
    pub fn apply_step(&mut self, step: Step) -> Result<(), EngineError> {
        match step {
            Step::Block(block) => {
                self.set_block_number(block);
                Ok(())
            }
            Step::Op(op) => self.apply(*op),
        }
    }

    /// Advance the ledger height. Height only moves forward; a regressive
    /// input is ignored.
    pub fn set_block_number(&mut self, block: BlockNumber) {
        if block < self.block_number {
            warn!(
                current = self.block_number,
                block, "ignoring regressive block height"
            );
            return;
        }
        self.block_number = block;
    }

    /// Apply a single operation on top of the current engine state.
    pub fn apply(&mut self, op: Operation) -> Result<(), EngineError> {
        let name = op.name();
        match op {
            Operation::StartChallengeFromTrade {
                trade,
                wallet,
                caller,
            } => {
                let result = self.start_from_trade(trade, wallet, caller, true);
                Self::log_result(name, wallet, &result);
                result?;
            }
            Operation::StartChallengeFromTradeByProxy {
                trade,
                wallet,
                caller,
            } => {
                let result = self.start_from_trade(trade, wallet, caller, false);
                Self::log_result(name, wallet, &result);
                result?;
            }
            Operation::StartChallengeFromPayment {
                payment,
                wallet,
                caller,
            } => {
                let result = self.start_from_payment(payment, wallet, caller, true);
                Self::log_result(name, wallet, &result);
                result?;
            }
            Operation::StartChallengeFromPaymentByProxy {
                payment,
                wallet,
                caller,
            } => {
                let result = self.start_from_payment(payment, wallet, caller, false);
                Self::log_result(name, wallet, &result);
                result?;
            }
            Operation::ChallengeByOrder { order, caller } => {
                let wallet = order.wallet;
                let result = self.challenge_by_order(order, caller);
                Self::log_result(name, wallet, &result);
                result?;
            }
            Operation::ChallengeByTrade {
                trade,
                wallet,
                caller,
            } => {
                let result = self.challenge_by_trade(trade, wallet, caller);
                Self::log_result(name, wallet, &result);
                result?;
            }
            Operation::ChallengeByPayment {
                payment,
                wallet,
                caller,
            } => {
                let result = self.challenge_by_payment(payment, wallet, caller);
                Self::log_result(name, wallet, &result);
                result?;
            }
            Operation::UnchallengeOrderCandidateByTrade {
                order,
                trade,
                caller,
            } => {
                let wallet = order.wallet;
                let result = self.unchallenge_order_candidate_by_trade(order, trade, caller);
                Self::log_result(name, wallet, &result);
                result?;
            }
        }
        Ok(())
    }

    /// Nonce and phase of the wallet's current challenge. No record reads
    /// as `(0, Closed)`; expiry is purely a function of block height.
    pub fn challenge_phase(&self, wallet: &Address) -> (Nonce, Phase) {
        match self.current_record(wallet) {
            Some(record) => (record.nonce, record.phase(self.block_number)),
            None => (0, Phase::Closed),
        }
    }

    /// Result and challenger of the wallet's challenge carrying `nonce`.
    /// Answers for past nonces too; no match reads as unknown.
    pub fn challenge_status(&self, wallet: &Address, nonce: Nonce) -> (ChallengeResult, Address) {
        self.challenges
            .get(wallet)
            .and_then(|history| history.iter().rev().find(|record| record.nonce == nonce))
            .map(|record| (record.result, record.challenger))
            .unwrap_or((ChallengeResult::Unknown, Address::ZERO))
    }

    /// The wallet's current challenge record, if it has ever had one.
    pub fn challenge(&self, wallet: &Address) -> Option<&ChallengeRecord> {
        self.current_record(wallet)
    }

    /// Current challenge record of every wallet that has one.
    pub fn current_challenges(&self) -> impl Iterator<Item = &ChallengeRecord> + '_ {
        self.challenges.values().filter_map(|history| history.last())
    }

    pub fn challenged_trades_count(&self, wallet: &Address) -> u64 {
        self.challenged_trades
            .get(wallet)
            .map_or(0, |trades| trades.len() as u64)
    }

    pub fn challenged_payments_count(&self, wallet: &Address) -> u64 {
        self.challenged_payments
            .get(wallet)
            .map_or(0, |payments| payments.len() as u64)
    }

    pub fn candidates(&self) -> &CandidateRegistry {
        &self.candidates
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn block_number(&self) -> BlockNumber {
        self.block_number
    }

    pub fn operator(&self) -> Address {
        self.operator
    }
}

/// Private API
impl Engine {
    /// Small helper to log `apply` results
    fn log_result<E: std::fmt::Display>(op: &str, wallet: Address, result: &Result<(), E>) {
        match result {
            Ok(()) => {
                info!(wallet = %wallet, "{op} applied");
            }
            Err(e) => {
                info!(wallet = %wallet, reason = %e, "{op} rejected");
            }
        }
    }

    fn current_record(&self, wallet: &Address) -> Option<&ChallengeRecord> {
        self.challenges.get(wallet).and_then(|history| history.last())
    }

    /// Gates common to every start path: wallet suspension and the
    /// earliest-settlement block.
    fn check_start_gates(&self, wallet: &Address) -> Result<(), OperationalGateError> {
        if self.collab.wallet_locker.is_locked(wallet) {
            return Err(OperationalGateError::WalletLocked { wallet: *wallet });
        }
        let earliest = self.collab.configuration.earliest_settlement_block_number();
        if self.block_number < earliest {
            return Err(OperationalGateError::BeforeEarliestSettlement {
                current: self.block_number,
                earliest,
            });
        }
        Ok(())
    }

    /// Direct starts take the operator or the wallet itself; proxy starts
    /// are operator-only.
    fn check_start_caller(
        &self,
        caller: Address,
        wallet: Address,
        balance_reward: bool,
    ) -> Result<(), AuthorizationError> {
        if balance_reward {
            if caller != self.operator && caller != wallet {
                return Err(AuthorizationError::CallerNotPartyNorOperator { caller, wallet });
            }
        } else if caller != self.operator {
            return Err(AuthorizationError::CallerNotOperator { caller });
        }
        Ok(())
    }

    fn check_no_active_challenge(&self, wallet: &Address) -> Result<(), StateConflictError> {
        if let Some(record) = self.current_record(wallet) {
            if !record.is_expired(self.block_number) {
                return Err(StateConflictError::ChallengeActive {
                    wallet: *wallet,
                    expiration: record.expiration(),
                });
            }
        }
        Ok(())
    }

    /// The wallet's current record, required to exist and be unexpired.
    fn active_record(&self, wallet: &Address) -> Result<&ChallengeRecord, StateConflictError> {
        let record = self
            .current_record(wallet)
            .ok_or(StateConflictError::NoChallenge { wallet: *wallet })?;
        if record.is_expired(self.block_number) {
            return Err(StateConflictError::ChallengeClosed {
                wallet: *wallet,
                expiration: record.expiration(),
            });
        }
        Ok(record)
    }

    fn seed_target_balance(
        &self,
        wallet: &Address,
        currency: &Currency,
        block: BlockNumber,
    ) -> Amount {
        match self.collab.balance_tracker.last_logged_balance(
            wallet,
            currency,
            BalanceType::Deposited,
            block,
        ) {
            Some(log) => log.amount,
            None => {
                debug!(
                    wallet = %wallet,
                    currency = %currency,
                    block,
                    "no deposited balance log at or before the challenged block"
                );
                Amount::ZERO
            }
        }
    }

    fn push_record(
        &mut self,
        wallet: Address,
        nonce: Nonce,
        timeout: u64,
        driip: ChallengedDriip,
        target_balance_amount: Amount,
        balance_reward: bool,
    ) {
        self.challenges.entry(wallet).or_default().push(ChallengeRecord {
            wallet,
            nonce,
            challenge_start: self.block_number,
            timeout,
            result: ChallengeResult::Qualified,
            candidate_type: CandidateType::None,
            candidate_index: 0,
            challenger: Address::ZERO,
            driip,
            target_balance_amount,
            balance_reward,
        });
    }

    fn start_from_trade(
        &mut self,
        trade: Trade,
        wallet: Address,
        caller: Address,
        balance_reward: bool,
    ) -> Result<(), EngineError> {
        self.check_start_gates(&wallet)?;
        if !self.collab.validator.is_genuine_trade_seal(&trade) {
            return Err(AuthenticityError::TradeSeal.into());
        }
        if !trade.is_party(&wallet) {
            return Err(ReferenceMismatchError::WalletNotTradeParty { wallet }.into());
        }
        self.check_start_caller(caller, wallet, balance_reward)?;
        self.check_no_active_challenge(&wallet)?;

        let nonce = trade.nonce;
        let currency = trade.currencies.intended;
        let timeout = self.collab.configuration.challenge_timeout(&currency);
        let target_balance_amount =
            self.seed_target_balance(&wallet, &currency, trade.block_number);

        let history = self.challenged_trades.entry(wallet).or_default();
        history.push(trade);
        let driip = ChallengedDriip::Trade(history.len() - 1);

        self.push_record(wallet, nonce, timeout, driip, target_balance_amount, balance_reward);
        self.events.push(Event::StartChallengeFromTrade { wallet, nonce });
        Ok(())
    }

    fn start_from_payment(
        &mut self,
        payment: Payment,
        wallet: Address,
        caller: Address,
        balance_reward: bool,
    ) -> Result<(), EngineError> {
        self.check_start_gates(&wallet)?;
        if !self.collab.validator.is_genuine_payment_seals(&payment) {
            return Err(AuthenticityError::PaymentSeals.into());
        }
        // Only the sender's outgoing balance can be contested.
        if !payment.is_sender(&wallet) {
            return Err(ReferenceMismatchError::WalletNotPaymentSender { wallet }.into());
        }
        self.check_start_caller(caller, wallet, balance_reward)?;
        self.check_no_active_challenge(&wallet)?;

        let nonce = payment.nonce;
        let currency = payment.currency;
        let timeout = self.collab.configuration.challenge_timeout(&currency);
        let target_balance_amount =
            self.seed_target_balance(&wallet, &currency, payment.block_number);

        let history = self.challenged_payments.entry(wallet).or_default();
        history.push(payment);
        let driip = ChallengedDriip::Payment(history.len() - 1);

        self.push_record(wallet, nonce, timeout, driip, target_balance_amount, balance_reward);
        self.events.push(Event::StartChallengeFromPayment { wallet, nonce });
        Ok(())
    }

    /// Recorded current balance of `wallet` in `currency` on the driip the
    /// record was started from. `None` when the currency matches neither
    /// of the challenged driip's currencies.
    fn challenged_balance(
        &self,
        wallet: &Address,
        record: &ChallengeRecord,
        currency: &Currency,
    ) -> Option<Amount> {
        match record.driip {
            ChallengedDriip::Trade(index) => self
                .challenged_trades
                .get(wallet)?
                .get(index)?
                .balance(wallet, currency),
            ChallengedDriip::Payment(index) => self
                .challenged_payments
                .get(wallet)?
                .get(index)?
                .balance(wallet, currency),
        }
    }

    /// The admission gate shared by every candidate kind: the implied
    /// transfer must strictly exceed the recorded balance.
    fn check_admission(
        &self,
        wallet: &Address,
        currency: Currency,
        transfer: Amount,
    ) -> Result<(), EngineError> {
        let record = self.active_record(wallet)?;
        let balance = self
            .challenged_balance(wallet, record, &currency)
            .ok_or(ReferenceMismatchError::CurrencyMismatch { currency })?;
        if transfer <= balance {
            return Err(EvidenceInsufficientError::WithinLimits { transfer, balance }.into());
        }
        Ok(())
    }

    fn disqualify(
        &mut self,
        wallet: Address,
        candidate_type: CandidateType,
        candidate_index: u64,
        challenger: Address,
    ) {
        if let Some(record) = self
            .challenges
            .get_mut(&wallet)
            .and_then(|history| history.last_mut())
        {
            record.disqualify(candidate_type, candidate_index, challenger);
        }
    }

    fn challenge_by_order(&mut self, order: Order, caller: Address) -> Result<(), EngineError> {
        if !self.collab.validator.is_genuine_order_seals(&order) {
            return Err(AuthenticityError::OrderSeals.into());
        }
        let hash = order.seals.exchange.hash;
        if self.collab.cancel_orders.is_order_cancelled(&hash) {
            return Err(AuthenticityError::OrderCancelled { hash }.into());
        }
        let wallet = order.wallet;
        self.check_admission(&wallet, order.considered_currency(), order.transfer_amount())?;

        let candidate_index = self.candidates.add_order(order);
        self.disqualify(wallet, CandidateType::Order, candidate_index, caller);
        self.events.push(Event::ChallengeByOrder {
            wallet,
            candidate_index,
            challenger: caller,
        });
        Ok(())
    }

    fn challenge_by_trade(
        &mut self,
        trade: Trade,
        wallet: Address,
        caller: Address,
    ) -> Result<(), EngineError> {
        if !self.collab.validator.is_genuine_trade_seal(&trade) {
            return Err(AuthenticityError::TradeSeal.into());
        }
        let party = trade
            .party(&wallet)
            .ok_or(ReferenceMismatchError::WalletNotTradeParty { wallet })?;
        let hash = party.order.hashes.exchange;
        if self.collab.cancel_orders.is_order_cancelled(&hash) {
            return Err(AuthenticityError::OrderCancelled { hash }.into());
        }
        self.check_admission(&wallet, trade.considered_currency(), trade.transfer_amount())?;

        let candidate_index = self.candidates.add_trade(trade);
        self.disqualify(wallet, CandidateType::Trade, candidate_index, caller);
        self.events.push(Event::ChallengeByTrade {
            wallet,
            candidate_index,
            challenger: caller,
        });
        Ok(())
    }

    fn challenge_by_payment(
        &mut self,
        payment: Payment,
        wallet: Address,
        caller: Address,
    ) -> Result<(), EngineError> {
        if !self.collab.validator.is_genuine_payment_seals(&payment) {
            return Err(AuthenticityError::PaymentSeals.into());
        }
        // A recipient-side submission evidences an inflow, not a transfer
        // out of the wallet.
        if !payment.is_sender(&wallet) {
            return Err(ReferenceMismatchError::WalletNotPaymentSender { wallet }.into());
        }
        self.check_admission(&wallet, payment.currency, payment.transfer_amount())?;

        let candidate_index = self.candidates.add_payment(payment);
        self.disqualify(wallet, CandidateType::Payment, candidate_index, caller);
        self.events.push(Event::ChallengeByPayment {
            wallet,
            candidate_index,
            challenger: caller,
        });
        Ok(())
    }

    fn unchallenge_order_candidate_by_trade(
        &mut self,
        order: Order,
        trade: Trade,
        caller: Address,
    ) -> Result<(), EngineError> {
        // Each seal is verified on its own; sharing one signature across
        // both order seals must fail one of the two checks.
        if !self.collab.validator.is_genuine_order_wallet_seal(&order) {
            return Err(AuthenticityError::OrderWalletSeal.into());
        }
        if !self.collab.validator.is_genuine_order_exchange_seal(&order) {
            return Err(AuthenticityError::OrderExchangeSeal.into());
        }
        if !self.collab.validator.is_genuine_trade_seal(&trade) {
            return Err(AuthenticityError::TradeSeal.into());
        }

        let wallet = order.wallet;
        let party = trade
            .party(&wallet)
            .ok_or(ReferenceMismatchError::WalletNotTradeParty { wallet })?;
        // Matched by hash reference, not just wallet.
        let order_hash = order.seals.exchange.hash;
        if party.order.hashes.exchange != order_hash {
            return Err(ReferenceMismatchError::OrderNotFilledByTrade { hash: order_hash }.into());
        }

        let record = self.active_record(&wallet)?;
        if record.candidate_type != CandidateType::Order {
            return Err(StateConflictError::CandidateNotOrder {
                wallet,
                actual: record.candidate_type,
            }
            .into());
        }
        if !self
            .candidates
            .order(record.candidate_index)
            .is_some_and(|candidate| candidate.seals.exchange.hash == order_hash)
        {
            return Err(ReferenceMismatchError::CandidateOrderMismatch { hash: order_hash }.into());
        }
        let challenger = record.challenger;
        let balance_reward = record.balance_reward;

        if let Some(record) = self
            .challenges
            .get_mut(&wallet)
            .and_then(|history| history.last_mut())
        {
            record.requalify();
        }
        self.events
            .push(Event::UnchallengeOrderCandidateByTrade { wallet, challenger });

        if balance_reward {
            let stake = self
                .collab
                .configuration
                .unchallenge_order_candidate_by_trade_stake();
            self.collab
                .security_bond
                .stage(&caller, &stake.currency, stake.amount);
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Address::ZERO)
    }
}
