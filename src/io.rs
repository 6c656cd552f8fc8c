//! Script ingestion and summary output.
//!
//! The binary replays JSON-Lines scripts of steps and writes one CSV row
//! per wallet with the state of its current challenge.

use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::Engine;
use crate::model::{Nonce, Step};

/// Errors that can occur when reading script lines
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: failed to read: {source}")]
    Read { line: usize, source: io::Error },

    #[error("line {line}: failed to parse step: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

/// Read steps from a JSON-Lines script file. Blank lines are skipped.
pub fn read_steps(path: impl AsRef<Path>) -> impl Iterator<Item = Result<Step, ScriptError>> {
    let file = File::open(path).expect("failed to open script file");

    io::BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(|(idx, result)| {
            let line = idx + 1;
            match result {
                Ok(text) if text.trim().is_empty() => None,
                Ok(text) => Some(
                    serde_json::from_str::<Step>(&text)
                        .map_err(|source| ScriptError::Parse { line, source }),
                ),
                Err(source) => Some(Err(ScriptError::Read { line, source })),
            }
        })
}

#[derive(Debug, Serialize)]
struct SummaryRow {
    wallet: String,
    nonce: Nonce,
    phase: String,
    result: String,
    candidate_type: String,
    candidate_index: u64,
    challenger: String,
}

/// Write one CSV row per wallet with a challenge, sorted by wallet.
pub fn write_summary(engine: &Engine, writer: impl io::Write) {
    let mut rows: Vec<SummaryRow> = engine
        .current_challenges()
        .map(|record| SummaryRow {
            wallet: record.wallet.to_string(),
            nonce: record.nonce,
            phase: record.phase(engine.block_number()).to_string(),
            result: record.result.to_string(),
            candidate_type: record.candidate_type.to_string(),
            candidate_index: record.candidate_index,
            challenger: record.challenger.to_string(),
        })
        .collect();
    rows.sort_by(|a, b| a.wallet.cmp(&b.wallet));

    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(&row).expect("failed to write csv row");
    }
    writer.flush().expect("failed to flush csv writer");
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::Amount;
    use crate::currency::{Address, Currency, Hash, Signature};
    use crate::model::{
        CurrencyPair, FigurePair, Operation, OrderHashes, OrderReference, Seal, Trade,
        TradeBalances, TradeParty, TradeTransfers,
    };

    fn write_script(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn trade(wallet: Address) -> Trade {
        let seal = |n: u64| Seal {
            hash: Hash::from_low_u64(n),
            signature: Signature::new(vec![n as u8]),
        };
        let party = |wallet: Address, tag: u64| TradeParty {
            wallet,
            order: OrderReference {
                hashes: OrderHashes {
                    wallet: Hash::from_low_u64(tag),
                    exchange: Hash::from_low_u64(tag + 1),
                },
            },
            balances: TradeBalances {
                intended: FigurePair {
                    current: Amount::from_scaled(500),
                    previous: Amount::from_scaled(600),
                },
                conjugate: FigurePair {
                    current: Amount::ZERO,
                    previous: Amount::from_scaled(100),
                },
            },
        };
        Trade {
            nonce: 1,
            block_number: 5,
            currencies: CurrencyPair {
                intended: Currency {
                    contract: Address::from_low_u64(1),
                    id: 0,
                },
                conjugate: Currency {
                    contract: Address::from_low_u64(2),
                    id: 0,
                },
            },
            buyer: party(wallet, 0x10),
            seller: party(Address::from_low_u64(0xdd), 0x20),
            transfers: TradeTransfers::default(),
            seal: seal(0x30),
        }
    }

    #[test]
    fn read_block_step() {
        let file = write_script("{\"block\":42}\n");
        let steps: Vec<_> = read_steps(file.path()).collect();
        assert_eq!(steps.len(), 1);
        assert!(matches!(steps[0], Ok(Step::Block(42))));
    }

    #[test]
    fn read_skips_blank_lines() {
        let file = write_script("{\"block\":1}\n\n{\"block\":2}\n");
        let steps: Vec<_> = read_steps(file.path()).collect();
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[1], Ok(Step::Block(2))));
    }

    #[test]
    fn read_reports_parse_error_with_line_number() {
        let file = write_script("{\"block\":1}\nnot json\n");
        let steps: Vec<_> = read_steps(file.path()).collect();
        assert_eq!(steps.len(), 2);
        assert!(steps[0].is_ok());
        assert!(matches!(
            steps[1].as_ref().unwrap_err(),
            ScriptError::Parse { line: 2, .. }
        ));
    }

    #[test]
    fn read_operation_step_round_trips() {
        let wallet = Address::from_low_u64(7);
        let step = Step::Op(Box::new(Operation::StartChallengeFromTrade {
            trade: trade(wallet),
            wallet,
            caller: wallet,
        }));
        let file = write_script(&format!("{}\n", serde_json::to_string(&step).unwrap()));

        let steps: Vec<_> = read_steps(file.path()).collect();
        assert_eq!(steps.len(), 1);
        match steps.into_iter().next().unwrap().unwrap() {
            Step::Op(op) => {
                assert!(matches!(*op, Operation::StartChallengeFromTrade { .. }))
            }
            other => panic!("expected operation step, got {other:?}"),
        }
    }

    #[test]
    fn summary_lists_current_challenges_sorted_by_wallet() {
        let mut engine = Engine::new(Address::ZERO);
        engine.set_block_number(10);
        let first = Address::from_low_u64(0x0b);
        let second = Address::from_low_u64(0x0a);
        for wallet in [first, second] {
            engine
                .apply(Operation::StartChallengeFromTrade {
                    trade: trade(wallet),
                    wallet,
                    caller: wallet,
                })
                .unwrap();
        }

        let mut output = Vec::new();
        write_summary(&engine, &mut output);
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "wallet,nonce,phase,result,candidate_type,candidate_index,challenger"
        );
        assert!(lines[1].starts_with(&second.to_string()));
        assert!(lines[1].contains(",1,dispute,qualified,none,0,"));
        assert!(lines[1].ends_with(&Address::ZERO.to_string()));
        assert!(lines[2].starts_with(&first.to_string()));
    }
}
