//! Unspent-output bundles and the coin view seam.

use std::collections::HashMap;
use std::sync::RwLock;

use xtd_consensus::Hash256;
use xtd_primitives::transaction::{Transaction, TxOut};

/// The still-unspent outputs of a single transaction, plus the height of the
/// block that confirmed it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Coins {
    pub outputs: Vec<Option<TxOut>>,
    pub height: u32,
}

impl Coins {
    pub fn from_tx(tx: &Transaction, height: u32) -> Self {
        let outputs = tx
            .vout
            .iter()
            .map(|output| (!output.is_null()).then(|| output.clone()))
            .collect();
        Self { outputs, height }
    }

    pub fn is_available(&self, index: u32) -> bool {
        matches!(self.outputs.get(index as usize), Some(Some(_)))
    }

    /// Marks one output spent, trimming trailing spent slots. Returns false
    /// when the output was already gone.
    pub fn spend(&mut self, index: u32) -> bool {
        let Some(slot) = self.outputs.get_mut(index as usize) else {
            return false;
        };
        if slot.is_none() {
            return false;
        }
        *slot = None;
        while matches!(self.outputs.last(), Some(None)) {
            self.outputs.pop();
        }
        true
    }

    /// True once every output has been spent.
    pub fn is_pruned(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Read access to per-transaction unspent outputs.
pub trait CoinsView {
    fn get_coins(&self, txid: &Hash256) -> Option<Coins>;
    fn have_coins(&self, txid: &Hash256) -> bool;
}

impl<T: CoinsView + ?Sized> CoinsView for &T {
    fn get_coins(&self, txid: &Hash256) -> Option<Coins> {
        (**self).get_coins(txid)
    }

    fn have_coins(&self, txid: &Hash256) -> bool {
        (**self).have_coins(txid)
    }
}

/// Coin view holding everything in memory. Stands in for the chain tip in
/// tests and offline tools.
#[derive(Default)]
pub struct MemoryCoinsView {
    inner: RwLock<HashMap<Hash256, Coins>>,
}

impl MemoryCoinsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_coins(&self, txid: Hash256, coins: Coins) {
        let mut guard = self.inner.write().expect("coins view lock");
        guard.insert(txid, coins);
    }

    pub fn remove_coins(&self, txid: &Hash256) {
        let mut guard = self.inner.write().expect("coins view lock");
        guard.remove(txid);
    }
}

impl CoinsView for MemoryCoinsView {
    fn get_coins(&self, txid: &Hash256) -> Option<Coins> {
        let guard = self.inner.read().expect("coins view lock");
        guard.get(txid).cloned()
    }

    fn have_coins(&self, txid: &Hash256) -> bool {
        let guard = self.inner.read().expect("coins view lock");
        guard.contains_key(txid)
    }
}
