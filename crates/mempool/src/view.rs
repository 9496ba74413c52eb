//! Coin view overlay that unifies confirmed outputs with pool residents.

use xtd_chainstate::{Coins, CoinsView};
use xtd_consensus::Hash256;

use crate::entry::MEMPOOL_HEIGHT;
use crate::pool::Mempool;

/// A coin view backed by a base (confirmed-chain) view, with unconfirmed
/// pool transactions layered on top at the sentinel height. Script
/// validators read through this so a pool transaction can spend the outputs
/// of another that is still waiting for a block.
pub struct MempoolCoinsView<'a, V> {
    base: &'a V,
    mempool: &'a Mempool,
}

impl<'a, V: CoinsView> MempoolCoinsView<'a, V> {
    pub fn new(base: &'a V, mempool: &'a Mempool) -> Self {
        Self { base, mempool }
    }
}

impl<V: CoinsView> CoinsView for MempoolCoinsView<'_, V> {
    fn get_coins(&self, txid: &Hash256) -> Option<Coins> {
        if let Some(coins) = self.base.get_coins(txid) {
            return Some(coins);
        }
        self.mempool
            .lookup(txid)
            .map(|tx| Coins::from_tx(&tx, MEMPOOL_HEIGHT))
    }

    fn have_coins(&self, txid: &Hash256) -> bool {
        self.mempool.exists(txid) || self.base.have_coins(txid)
    }
}
