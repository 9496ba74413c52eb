//! One pool resident and its admission-time metadata.

use xtd_primitives::encoding::encode;
use xtd_primitives::transaction::Transaction;

/// Height sentinel marking an output as unconfirmed (still in the pool).
pub const MEMPOOL_HEIGHT: u32 = 0x7fff_ffff;

/// A transaction in the pool. Every field is fixed at admission.
#[derive(Clone, Debug, PartialEq)]
pub struct MempoolEntry {
    tx: Transaction,
    fee: i64,
    time: i64,
    entry_priority: f64,
    entry_height: u32,
    tx_size: usize,
}

impl Default for MempoolEntry {
    fn default() -> Self {
        Self {
            tx: Transaction::default(),
            fee: 0,
            time: 0,
            entry_priority: 0.0,
            entry_height: MEMPOOL_HEIGHT,
            tx_size: 0,
        }
    }
}

impl MempoolEntry {
    pub fn new(tx: Transaction, fee: i64, time: i64, entry_priority: f64, entry_height: u32) -> Self {
        let tx_size = encode(&tx).len();
        Self {
            tx,
            fee,
            time,
            entry_priority,
            entry_height,
            tx_size,
        }
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn into_tx(self) -> Transaction {
        self.tx
    }

    pub fn fee(&self) -> i64 {
        self.fee
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn entry_priority(&self) -> f64 {
        self.entry_priority
    }

    pub fn height(&self) -> u32 {
        self.entry_height
    }

    pub fn tx_size(&self) -> usize {
        self.tx_size
    }

    /// Priority at `current_height`. Grows with the depth the transaction
    /// has been waiting, scaled by the value it moves per byte.
    pub fn priority(&self, current_height: u32) -> f64 {
        if self.tx_size == 0 {
            return self.entry_priority;
        }
        let depth = current_height.saturating_sub(self.entry_height) as f64;
        let value = self.tx.value_out().saturating_add(self.fee).max(0) as f64;
        self.entry_priority + depth * value / (self.tx_size as f64)
    }
}
