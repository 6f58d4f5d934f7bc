//! Shared setup for integration tests

#![allow(dead_code)]

use custody_contracts::config::{EngineConfig, LedgerConfig};
use custody_contracts::engine::Engine;
use custody_contracts::ledger::MemoryLedger;
use custody_types::ids::Identity;
use custody_types::numeric::Amount;
use tracing_subscriber::EnvFilter;

pub const RESERVE: Amount = Amount::new(100_000);
pub const STARTING_BALANCE: Amount = Amount::new(10_000_000);

pub fn user(name: &str) -> Identity {
    Identity::user(name)
}

/// Fee-free engine with the named users funded.
pub fn funded_engine(users: &[&str]) -> Engine<MemoryLedger> {
    funded_with(LedgerConfig::without_fees(), users)
}

/// Route engine logs to the test writer. `RUST_LOG` overrides the default
/// `warn` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn funded_with(config: LedgerConfig, users: &[&str]) -> Engine<MemoryLedger> {
    init_tracing();
    let mut ledger = MemoryLedger::new(config);
    for name in users {
        ledger.fund(&user(name), STARTING_BALANCE).unwrap();
    }
    Engine::new(ledger, EngineConfig::default())
}

pub fn amount(units: u64) -> Amount {
    Amount::new(units)
}
