use std::env;

use settlement_eng::io::{read_steps, write_summary};
use settlement_eng::{Address, Engine};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .expect("usage: settlement-eng <script.jsonl> [operator-address]");
    let operator = match env::args().nth(2) {
        Some(address) => address.parse().expect("invalid operator address"),
        None => Address::ZERO,
    };

    if !path.ends_with(".jsonl") {
        warn!(path, "input file seems to not be a jsonl file");
    }

    let mut engine = Engine::new(operator);
    let (step_sender, step_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in read_steps(&path) {
            match result {
                Ok(step) => {
                    step_sender.send(step).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(step_receiver)).await;

    write_summary(&engine, std::io::stdout().lock());
}
