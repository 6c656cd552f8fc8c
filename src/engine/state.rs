//! Per-wallet challenge records and their state transitions.

use std::fmt;

use crate::Amount;
use crate::currency::Address;
use crate::model::{BlockNumber, Nonce};

/// Observed phase of a wallet's challenge; a pure function of block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Dispute,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Dispute => write!(f, "dispute"),
            Phase::Closed => write!(f, "closed"),
        }
    }
}

/// Outcome of a challenge. `Unknown` is only ever a query answer for a
/// nonce no record carries; stored records are qualified or disqualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeResult {
    Unknown,
    Qualified,
    Disqualified,
}

impl fmt::Display for ChallengeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeResult::Unknown => write!(f, "unknown"),
            ChallengeResult::Qualified => write!(f, "qualified"),
            ChallengeResult::Disqualified => write!(f, "disqualified"),
        }
    }
}

/// Kind of the candidate that disqualified a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateType {
    None,
    Order,
    Trade,
    Payment,
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateType::None => write!(f, "none"),
            CandidateType::Order => write!(f, "order"),
            CandidateType::Trade => write!(f, "trade"),
            CandidateType::Payment => write!(f, "payment"),
        }
    }
}

/// Reference from a challenge record to the driip it was started from,
/// by index into the wallet's challenged-driip history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengedDriip {
    Trade(usize),
    Payment(usize),
}

/// The durable state of one settlement challenge.
///
/// Records are never deleted; a wallet's current challenge is the last
/// entry of its record history. Expiry is observational: a record past
/// its expiration is closed without any stored transition.
#[derive(Debug, Clone)]
pub struct ChallengeRecord {
    pub wallet: Address,
    /// Nonce of the driip under challenge.
    pub nonce: Nonce,
    pub challenge_start: BlockNumber,
    /// Window length in blocks.
    pub timeout: u64,
    pub result: ChallengeResult,
    pub candidate_type: CandidateType,
    /// Index into the matching candidate registry; meaningful only when
    /// `candidate_type != None`.
    pub candidate_index: u64,
    /// Zero address unless disqualified.
    pub challenger: Address,
    pub driip: ChallengedDriip,
    /// Last logged deposited balance at or before the challenged driip's
    /// block, captured when the challenge starts.
    pub target_balance_amount: Amount,
    /// Direct starts are reward-eligible on requalification; proxy starts
    /// are not.
    pub balance_reward: bool,
}

impl ChallengeRecord {
    pub fn expiration(&self) -> BlockNumber {
        self.challenge_start.saturating_add(self.timeout)
    }

    pub fn is_expired(&self, block: BlockNumber) -> bool {
        block > self.expiration()
    }

    pub fn phase(&self, block: BlockNumber) -> Phase {
        if self.is_expired(block) {
            Phase::Closed
        } else {
            Phase::Dispute
        }
    }

    /// Mark the challenge disqualified by an admitted candidate.
    /// Last valid write wins; a later admissible candidate overwrites.
    pub fn disqualify(
        &mut self,
        candidate_type: CandidateType,
        candidate_index: u64,
        challenger: Address,
    ) {
        self.result = ChallengeResult::Disqualified;
        self.candidate_type = candidate_type;
        self.candidate_index = candidate_index;
        self.challenger = challenger;
    }

    /// Reset a disqualified challenge back to qualified.
    pub fn requalify(&mut self) {
        self.result = ChallengeResult::Qualified;
        self.candidate_type = CandidateType::None;
        self.candidate_index = 0;
        self.challenger = Address::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: BlockNumber, timeout: u64) -> ChallengeRecord {
        ChallengeRecord {
            wallet: Address::from_low_u64(1),
            nonce: 5,
            challenge_start: start,
            timeout,
            result: ChallengeResult::Qualified,
            candidate_type: CandidateType::None,
            candidate_index: 0,
            challenger: Address::ZERO,
            driip: ChallengedDriip::Trade(0),
            target_balance_amount: Amount::ZERO,
            balance_reward: true,
        }
    }

    #[test]
    fn expiration_is_start_plus_timeout() {
        let record = record(10, 5);
        assert_eq!(record.expiration(), 15);
    }

    #[test]
    fn phase_is_pure_in_block_height() {
        let record = record(10, 5);
        assert_eq!(record.phase(10), Phase::Dispute);
        assert_eq!(record.phase(15), Phase::Dispute);
        assert_eq!(record.phase(16), Phase::Closed);
        // Same record, queried again at an earlier height: still open.
        assert_eq!(record.phase(12), Phase::Dispute);
    }

    #[test]
    fn zero_timeout_expires_on_next_block() {
        let record = record(10, 0);
        assert!(!record.is_expired(10));
        assert!(record.is_expired(11));
    }

    #[test]
    fn disqualify_then_requalify_round_trip() {
        let mut record = record(10, 5);
        let challenger = Address::from_low_u64(9);
        record.disqualify(CandidateType::Order, 3, challenger);
        assert_eq!(record.result, ChallengeResult::Disqualified);
        assert_eq!(record.candidate_type, CandidateType::Order);
        assert_eq!(record.candidate_index, 3);
        assert_eq!(record.challenger, challenger);

        record.requalify();
        assert_eq!(record.result, ChallengeResult::Qualified);
        assert_eq!(record.candidate_type, CandidateType::None);
        assert_eq!(record.candidate_index, 0);
        assert_eq!(record.challenger, Address::ZERO);
    }
}
