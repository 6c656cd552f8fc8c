//! Core domain types: driip records and the engine's input operations.
//!
//! Driips are immutable, externally-authenticated financial records. The
//! engine only reads the fields the challenge logic needs; seal
//! verification is delegated to the Validator collaborator.

use serde::{Deserialize, Serialize};

use crate::Amount;
use crate::currency::{Address, Currency, Hash, Signature};

/// Driip nonce.
pub type Nonce = u64;

/// Ledger block height.
pub type BlockNumber = u64;

/// A signature over a hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seal {
    pub hash: Hash,
    pub signature: Signature,
}

/// The two seals an order carries: the placing wallet's and the exchange's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSeals {
    pub wallet: Seal,
    pub exchange: Seal,
}

/// The intended/conjugate currency pair of an order placement or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub intended: Currency,
    pub conjugate: Currency,
}

/// Current/previous figure pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FigurePair {
    pub current: Amount,
    pub previous: Amount,
}

/// An order placement: what the wallet offered to exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacement {
    pub amount: Amount,
    pub currencies: CurrencyPair,
    pub residuals: FigurePair,
}

/// A signed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub wallet: Address,
    pub nonce: Nonce,
    pub block_number: BlockNumber,
    pub placement: OrderPlacement,
    pub seals: OrderSeals,
}

impl Order {
    /// The currency an order candidate evidences a transfer in.
    pub fn considered_currency(&self) -> Currency {
        self.placement.currencies.conjugate
    }

    /// The single-transfer amount the order implies for its wallet.
    pub fn transfer_amount(&self) -> Amount {
        self.placement.amount.abs()
    }
}

/// Wallet-side and exchange-side hashes of the order a trade party filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHashes {
    pub wallet: Hash,
    pub exchange: Hash,
}

/// Reference from a trade party back to its filled order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReference {
    pub hashes: OrderHashes,
}

/// Per-currency balances of one trade party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeBalances {
    pub intended: FigurePair,
    pub conjugate: FigurePair,
}

/// One side of a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeParty {
    pub wallet: Address,
    pub order: OrderReference,
    pub balances: TradeBalances,
}

/// Single/net transfer figure pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferFigures {
    pub single: Amount,
    pub net: Amount,
}

/// Per-currency transfers of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeTransfers {
    pub intended: TransferFigures,
    pub conjugate: TransferFigures,
}

/// An exchange-sealed trade between a buyer and a seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub nonce: Nonce,
    pub block_number: BlockNumber,
    pub currencies: CurrencyPair,
    pub buyer: TradeParty,
    pub seller: TradeParty,
    pub transfers: TradeTransfers,
    /// Exchange seal.
    pub seal: Seal,
}

impl Trade {
    pub fn is_party(&self, wallet: &Address) -> bool {
        self.buyer.wallet == *wallet || self.seller.wallet == *wallet
    }

    /// The buyer or seller sub-record for `wallet`, if it is a party.
    pub fn party(&self, wallet: &Address) -> Option<&TradeParty> {
        if self.buyer.wallet == *wallet {
            Some(&self.buyer)
        } else if self.seller.wallet == *wallet {
            Some(&self.seller)
        } else {
            None
        }
    }

    /// Recorded current balance of `wallet` in `currency`, if both match.
    pub fn balance(&self, wallet: &Address, currency: &Currency) -> Option<Amount> {
        let party = self.party(wallet)?;
        if *currency == self.currencies.intended {
            Some(party.balances.intended.current)
        } else if *currency == self.currencies.conjugate {
            Some(party.balances.conjugate.current)
        } else {
            None
        }
    }

    /// The currency a trade candidate evidences a transfer in.
    pub fn considered_currency(&self) -> Currency {
        self.currencies.conjugate
    }

    /// The single-transfer amount the trade implies in its conjugate currency.
    pub fn transfer_amount(&self) -> Amount {
        self.transfers.conjugate.single.abs()
    }
}

/// One side of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentParty {
    pub wallet: Address,
    pub balances: FigurePair,
}

/// The two seals a payment carries: the sending wallet's and the exchange's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSeals {
    pub wallet: Seal,
    pub exchange: Seal,
}

/// A sealed payment from a sender to a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub nonce: Nonce,
    pub block_number: BlockNumber,
    pub amount: Amount,
    pub currency: Currency,
    pub sender: PaymentParty,
    pub recipient: PaymentParty,
    pub transfers: TransferFigures,
    pub seals: PaymentSeals,
}

impl Payment {
    pub fn is_sender(&self, wallet: &Address) -> bool {
        self.sender.wallet == *wallet
    }

    /// Recorded current balance of the sender in the payment currency.
    pub fn balance(&self, wallet: &Address, currency: &Currency) -> Option<Amount> {
        if self.sender.wallet == *wallet && *currency == self.currency {
            Some(self.sender.balances.current)
        } else {
            None
        }
    }

    /// The single-transfer amount the payment implies for its sender.
    pub fn transfer_amount(&self) -> Amount {
        self.transfers.single.abs()
    }
}

/// A protocol operation, the possible state-changing inputs of the engine.
///
/// `caller` is the ledger identity submitting the operation; authorization
/// checks compare it against the operator and the driip parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Open a settlement challenge on a trade for one of its party wallets.
    StartChallengeFromTrade {
        trade: Trade,
        wallet: Address,
        caller: Address,
    },
    /// Operator-only start on behalf of a wallet; not reward-eligible.
    StartChallengeFromTradeByProxy {
        trade: Trade,
        wallet: Address,
        caller: Address,
    },
    /// Open a settlement challenge on a payment for its sender wallet.
    StartChallengeFromPayment {
        payment: Payment,
        wallet: Address,
        caller: Address,
    },
    /// Operator-only start on behalf of a wallet; not reward-eligible.
    StartChallengeFromPaymentByProxy {
        payment: Payment,
        wallet: Address,
        caller: Address,
    },
    /// Submit an order as disqualifying evidence against its wallet's challenge.
    ChallengeByOrder { order: Order, caller: Address },
    /// Submit a trade as disqualifying evidence against a party wallet's challenge.
    ChallengeByTrade {
        trade: Trade,
        wallet: Address,
        caller: Address,
    },
    /// Submit a payment as disqualifying evidence against its sender's challenge.
    ChallengeByPayment {
        payment: Payment,
        wallet: Address,
        caller: Address,
    },
    /// Reverse an order-candidate disqualification with the trade that filled it.
    UnchallengeOrderCandidateByTrade {
        order: Order,
        trade: Trade,
        caller: Address,
    },
}

impl Operation {
    /// Short operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::StartChallengeFromTrade { .. } => "start_challenge_from_trade",
            Operation::StartChallengeFromTradeByProxy { .. } => {
                "start_challenge_from_trade_by_proxy"
            }
            Operation::StartChallengeFromPayment { .. } => "start_challenge_from_payment",
            Operation::StartChallengeFromPaymentByProxy { .. } => {
                "start_challenge_from_payment_by_proxy"
            }
            Operation::ChallengeByOrder { .. } => "challenge_by_order",
            Operation::ChallengeByTrade { .. } => "challenge_by_trade",
            Operation::ChallengeByPayment { .. } => "challenge_by_payment",
            Operation::UnchallengeOrderCandidateByTrade { .. } => {
                "unchallenge_order_candidate_by_trade"
            }
        }
    }
}

/// One entry of a replayed settlement log: a block-height advance or an
/// operation. Block height is an input of the replay, never wall-clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Block(BlockNumber),
    Op(Box<Operation>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn currency(n: u64) -> Currency {
        Currency {
            contract: Address::from_low_u64(n),
            id: 0,
        }
    }

    fn seal(n: u64) -> Seal {
        Seal {
            hash: Hash::from_low_u64(n),
            signature: Signature::new(vec![n as u8; 65]),
        }
    }

    fn party(wallet: u64, order_hash: u64) -> TradeParty {
        TradeParty {
            wallet: Address::from_low_u64(wallet),
            order: OrderReference {
                hashes: OrderHashes {
                    wallet: Hash::from_low_u64(order_hash),
                    exchange: Hash::from_low_u64(order_hash + 1),
                },
            },
            balances: TradeBalances {
                intended: FigurePair {
                    current: Amount::from_scaled(500),
                    previous: Amount::from_scaled(700),
                },
                conjugate: FigurePair {
                    current: Amount::from_scaled(900),
                    previous: Amount::from_scaled(1000),
                },
            },
        }
    }

    fn trade() -> Trade {
        Trade {
            nonce: 1,
            block_number: 10,
            currencies: CurrencyPair {
                intended: currency(1),
                conjugate: currency(2),
            },
            buyer: party(0xb, 100),
            seller: party(0x5, 200),
            transfers: TradeTransfers {
                intended: TransferFigures {
                    single: Amount::from_scaled(100),
                    net: Amount::from_scaled(200),
                },
                conjugate: TransferFigures {
                    single: Amount::from_scaled(-50),
                    net: Amount::from_scaled(-60),
                },
            },
            seal: seal(7),
        }
    }

    #[test]
    fn trade_party_lookup() {
        let trade = trade();
        assert!(trade.is_party(&Address::from_low_u64(0xb)));
        assert!(trade.is_party(&Address::from_low_u64(0x5)));
        assert!(!trade.is_party(&Address::from_low_u64(0x9)));
        assert_eq!(
            trade.party(&Address::from_low_u64(0x5)).unwrap().wallet,
            Address::from_low_u64(0x5)
        );
    }

    #[test]
    fn trade_balance_matches_currency_to_side() {
        let trade = trade();
        let buyer = Address::from_low_u64(0xb);
        assert_eq!(
            trade.balance(&buyer, &currency(1)),
            Some(Amount::from_scaled(500))
        );
        assert_eq!(
            trade.balance(&buyer, &currency(2)),
            Some(Amount::from_scaled(900))
        );
        assert_eq!(trade.balance(&buyer, &currency(3)), None);
        assert_eq!(trade.balance(&Address::from_low_u64(0x9), &currency(1)), None);
    }

    #[test]
    fn trade_transfer_amount_is_absolute_conjugate_single() {
        let trade = trade();
        assert_eq!(trade.transfer_amount(), Amount::from_scaled(50));
        assert_eq!(trade.considered_currency(), currency(2));
    }

    #[test]
    fn payment_balance_is_sender_only() {
        let payment = Payment {
            nonce: 2,
            block_number: 11,
            amount: Amount::from_scaled(300),
            currency: currency(1),
            sender: PaymentParty {
                wallet: Address::from_low_u64(0xa),
                balances: FigurePair {
                    current: Amount::from_scaled(400),
                    previous: Amount::from_scaled(700),
                },
            },
            recipient: PaymentParty {
                wallet: Address::from_low_u64(0xc),
                balances: FigurePair::default(),
            },
            transfers: TransferFigures {
                single: Amount::from_scaled(-300),
                net: Amount::from_scaled(-300),
            },
            seals: PaymentSeals {
                wallet: seal(1),
                exchange: seal(2),
            },
        };
        let sender = Address::from_low_u64(0xa);
        let recipient = Address::from_low_u64(0xc);
        assert_eq!(
            payment.balance(&sender, &currency(1)),
            Some(Amount::from_scaled(400))
        );
        assert_eq!(payment.balance(&sender, &currency(2)), None);
        assert_eq!(payment.balance(&recipient, &currency(1)), None);
        assert_eq!(payment.transfer_amount(), Amount::from_scaled(300));
    }

    #[test]
    fn order_transfer_is_absolute_placement_amount() {
        let order = Order {
            wallet: Address::from_low_u64(0xd),
            nonce: 3,
            block_number: 12,
            placement: OrderPlacement {
                amount: Amount::from_scaled(-1000),
                currencies: CurrencyPair {
                    intended: currency(1),
                    conjugate: currency(2),
                },
                residuals: FigurePair::default(),
            },
            seals: OrderSeals {
                wallet: seal(3),
                exchange: seal(4),
            },
        };
        assert_eq!(order.transfer_amount(), Amount::from_scaled(1000));
        assert_eq!(order.considered_currency(), currency(2));
    }

    #[test]
    fn step_serde_shapes() {
        let block: Step = serde_json::from_str(r#"{"block":42}"#).unwrap();
        assert!(matches!(block, Step::Block(42)));

        let json = serde_json::to_string(&Step::Block(7)).unwrap();
        assert_eq!(json, r#"{"block":7}"#);
    }
}
