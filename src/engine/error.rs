//! Error taxonomy for challenge processing.
//!
//! Every precondition is checked eagerly; the first failure rejects the
//! whole operation with no state change.

use thiserror::Error;

use crate::Amount;
use crate::currency::{Address, Currency, Hash};
use crate::engine::state::CandidateType;
use crate::model::BlockNumber;

/// Top-level error returned by [`Engine::apply`](super::Engine::apply).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("authorization failed: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("authenticity check failed: {0}")]
    Authenticity(#[from] AuthenticityError),

    #[error("state conflict: {0}")]
    StateConflict(#[from] StateConflictError),

    #[error("evidence insufficient: {0}")]
    Evidence(#[from] EvidenceInsufficientError),

    #[error("reference mismatch: {0}")]
    Reference(#[from] ReferenceMismatchError),

    #[error("operational gate: {0}")]
    Gate(#[from] OperationalGateError),
}

/// Caller is neither the operator nor an authorized party.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("caller {caller} is neither operator nor challenged wallet {wallet}")]
    CallerNotPartyNorOperator { caller: Address, wallet: Address },

    #[error("caller {caller} is not the operator")]
    CallerNotOperator { caller: Address },
}

/// Seal verification failed, or the driip is no longer live evidence.
#[derive(Debug, Error)]
pub enum AuthenticityError {
    #[error("order seals failed verification")]
    OrderSeals,

    #[error("order wallet seal failed verification")]
    OrderWalletSeal,

    #[error("order exchange seal failed verification")]
    OrderExchangeSeal,

    #[error("trade seal failed verification")]
    TradeSeal,

    #[error("payment seals failed verification")]
    PaymentSeals,

    #[error("order {hash} has been cancelled")]
    OrderCancelled { hash: Hash },
}

/// The wallet's challenge record is not in the state the operation needs.
#[derive(Debug, Error)]
pub enum StateConflictError {
    #[error("wallet {wallet} already has an active challenge until block {expiration}")]
    ChallengeActive {
        wallet: Address,
        expiration: BlockNumber,
    },

    #[error("wallet {wallet} has no challenge")]
    NoChallenge { wallet: Address },

    #[error("challenge for wallet {wallet} closed at block {expiration}")]
    ChallengeClosed {
        wallet: Address,
        expiration: BlockNumber,
    },

    #[error("challenge for wallet {wallet} holds a {actual} candidate, not an order")]
    CandidateNotOrder {
        wallet: Address,
        actual: CandidateType,
    },
}

/// The candidate does not prove insufficiency.
#[derive(Debug, Error)]
pub enum EvidenceInsufficientError {
    #[error("transfer {transfer} is within the recorded balance {balance}")]
    WithinLimits { transfer: Amount, balance: Amount },
}

/// The candidate's currency, party, or order reference does not match.
#[derive(Debug, Error)]
pub enum ReferenceMismatchError {
    #[error("currency {currency} does not match any challenged driip currency")]
    CurrencyMismatch { currency: Currency },

    #[error("wallet {wallet} is not a party of the trade")]
    WalletNotTradeParty { wallet: Address },

    #[error("wallet {wallet} is not the payment sender")]
    WalletNotPaymentSender { wallet: Address },

    #[error("order {hash} was not filled by the trade")]
    OrderNotFilledByTrade { hash: Hash },

    #[error("order {hash} is not the registered disqualifying candidate")]
    CandidateOrderMismatch { hash: Hash },
}

/// An external gate blocks the operation.
#[derive(Debug, Error)]
pub enum OperationalGateError {
    #[error("wallet {wallet} is locked")]
    WalletLocked { wallet: Address },

    #[error("block {current} is before earliest settlement block {earliest}")]
    BeforeEarliestSettlement {
        current: BlockNumber,
        earliest: BlockNumber,
    },
}
