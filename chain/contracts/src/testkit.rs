//! Shared fixtures for unit tests

use custody_types::ids::Identity;
use custody_types::numeric::Amount;

use crate::config::{EngineConfig, LedgerConfig};
use crate::engine::Engine;
use crate::ledger::MemoryLedger;

pub const RESERVE: Amount = Amount::new(100_000);
pub const STARTING_BALANCE: Amount = Amount::new(10_000_000);

pub type TestEngine = Engine<MemoryLedger>;

pub fn alice() -> Identity {
    Identity::user("alice")
}

pub fn bob() -> Identity {
    Identity::user("bob")
}

pub fn carol() -> Identity {
    Identity::user("carol")
}

pub fn dave() -> Identity {
    Identity::user("dave")
}

impl Engine<MemoryLedger> {
    /// Fee-free engine with every test user funded.
    pub fn funded() -> Self {
        let mut ledger = MemoryLedger::new(LedgerConfig::without_fees());
        for user in [alice(), bob(), carol(), dave()] {
            ledger
                .fund(&user, STARTING_BALANCE)
                .expect("funding test account");
        }
        Engine::new(ledger, EngineConfig::default())
    }

    pub fn balance(&self, who: &Identity) -> Amount {
        self.ledger().balance(who)
    }

    pub fn advance(&mut self, rounds: u64) {
        self.ledger_mut().advance(rounds);
    }
}
