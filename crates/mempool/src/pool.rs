//! The mempool store: transaction table plus spent-output index under one
//! exclusive lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use xtd_chainstate::{Coins, CoinsView};
use xtd_consensus::Hash256;
use xtd_log::{log_debug, log_warn};
use xtd_primitives::hash::hash_to_hex;
use xtd_primitives::outpoint::OutPoint;
use xtd_primitives::transaction::Transaction;

use crate::entry::MempoolEntry;
use crate::snapshot;

/// Back-reference from a spent outpoint to the pool transaction consuming
/// it: the consumer's id plus which of its inputs does the spending.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InPoint {
    pub txid: Hash256,
    pub input_index: u32,
}

pub(crate) struct MempoolInner {
    pub(crate) map_tx: HashMap<Hash256, MempoolEntry>,
    pub(crate) map_next_tx: BTreeMap<OutPoint, InPoint>,
    transactions_updated: u32,
    sanity_check: bool,
}

/// In-memory staging store for validated, unconfirmed transactions.
///
/// One exclusive lock guards both indexes; every public operation holds it
/// for its full duration. Whenever the lock is free, every input of every
/// resident is present in the spent-output index and vice versa.
pub struct Mempool {
    inner: Mutex<MempoolInner>,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MempoolInner {
                map_tx: HashMap::new(),
                map_next_tx: BTreeMap::new(),
                transactions_updated: 0,
                // Off by default: with it on, accepting a transaction is
                // O(N^2) in the pool size.
                sanity_check: false,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, MempoolInner> {
        self.inner.lock().expect("mempool lock")
    }

    pub fn set_sanity_check(&self, enabled: bool) {
        self.lock().sanity_check = enabled;
    }

    /// Inserts an entry without validating anything. The caller has already
    /// run every admission check; this only maintains the indexes.
    pub fn add_unchecked(&self, txid: Hash256, entry: MempoolEntry) -> bool {
        let mut inner = self.lock();
        for (input_index, input) in entry.tx().vin.iter().enumerate() {
            inner.map_next_tx.insert(
                input.prevout,
                InPoint {
                    txid,
                    input_index: input_index as u32,
                },
            );
        }
        inner.map_tx.insert(txid, entry);
        inner.bump();
        true
    }

    /// Removes `tx` and, when `recursive`, every pool transaction whose
    /// input chain reaches it. The returned list is in removal order:
    /// descendants before ancestors. The descent runs even when `tx` itself
    /// is not in the pool, so a confirmed transaction's stranded descendants
    /// can be evicted without it.
    pub fn remove(&self, tx: &Transaction, recursive: bool) -> Vec<Transaction> {
        let mut removed = Vec::new();
        let mut inner = self.lock();
        inner.remove_into(tx, recursive, &mut removed);
        removed
    }

    /// Evicts pool transactions spending any outpoint `tx` spends, together
    /// with their descendants. Called when a confirmed block claims outputs
    /// the pool thought were still free.
    pub fn remove_conflicts(&self, tx: &Transaction) -> Vec<Transaction> {
        let mut removed = Vec::new();
        let mut inner = self.lock();
        let txid = tx.txid();
        for input in &tx.vin {
            let Some(in_point) = inner.map_next_tx.get(&input.prevout).copied() else {
                continue;
            };
            if in_point.txid == txid {
                continue;
            }
            let Some(conflict) = inner.map_tx.get(&in_point.txid).map(|e| e.tx().clone()) else {
                continue;
            };
            inner.remove_into(&conflict, true, &mut removed);
        }
        removed
    }

    /// Marks as spent every output of `txid` that some pool transaction
    /// already consumes.
    pub fn prune_spent(&self, txid: &Hash256, coins: &mut Coins) {
        let inner = self.lock();
        let start = OutPoint::new(*txid, 0);
        for (outpoint, _) in inner.map_next_tx.range(start..) {
            if outpoint.hash != *txid {
                break;
            }
            coins.spend(outpoint.index);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map_tx.clear();
        inner.map_next_tx.clear();
        inner.bump();
    }

    pub fn query_hashes(&self) -> Vec<Hash256> {
        let inner = self.lock();
        let mut out: Vec<Hash256> = inner.map_tx.keys().copied().collect();
        out.sort();
        out
    }

    pub fn lookup(&self, txid: &Hash256) -> Option<Transaction> {
        let inner = self.lock();
        inner.map_tx.get(txid).map(|entry| entry.tx().clone())
    }

    pub fn exists(&self, txid: &Hash256) -> bool {
        self.lock().map_tx.contains_key(txid)
    }

    pub fn size(&self) -> usize {
        self.lock().map_tx.len()
    }

    /// Change token polled by the block template builder.
    pub fn transactions_updated(&self) -> u32 {
        self.lock().transactions_updated
    }

    pub fn add_transactions_updated(&self, n: u32) {
        let mut inner = self.lock();
        inner.transactions_updated = inner.transactions_updated.wrapping_add(n);
    }

    /// Full cross-index consistency check: every resident input resolves in
    /// the pool or in `coins`, and the spent-output index agrees with the
    /// transaction table in both directions. No-op unless sanity checks are
    /// enabled; a violation is a fatal programmer error.
    pub fn check(&self, coins: &dyn CoinsView) {
        let inner = self.lock();
        if !inner.sanity_check {
            return;
        }

        log_debug!(
            "checking mempool with {} transactions and {} inputs",
            inner.map_tx.len(),
            inner.map_next_tx.len()
        );

        for (txid, entry) in &inner.map_tx {
            for (input_index, input) in entry.tx().vin.iter().enumerate() {
                let prevout = &input.prevout;
                if let Some(parent) = inner.map_tx.get(&prevout.hash) {
                    let output = parent.tx().vout.get(prevout.index as usize);
                    assert!(
                        output.is_some_and(|out| !out.is_null()),
                        "mempool input {}:{} names a missing pool output",
                        hash_to_hex(&prevout.hash),
                        prevout.index
                    );
                } else {
                    let parent_coins = coins.get_coins(&prevout.hash).unwrap_or_else(|| {
                        panic!(
                            "mempool input {}:{} not found in coin view",
                            hash_to_hex(&prevout.hash),
                            prevout.index
                        )
                    });
                    assert!(
                        parent_coins.is_available(prevout.index),
                        "mempool input {}:{} already spent in coin view",
                        hash_to_hex(&prevout.hash),
                        prevout.index
                    );
                }
                assert_eq!(
                    inner.map_next_tx.get(prevout),
                    Some(&InPoint {
                        txid: *txid,
                        input_index: input_index as u32,
                    }),
                    "spent-output index out of step for {}",
                    hash_to_hex(txid)
                );
            }
        }

        for (outpoint, in_point) in &inner.map_next_tx {
            let entry = inner.map_tx.get(&in_point.txid).unwrap_or_else(|| {
                panic!(
                    "spent-output index references unknown transaction {}",
                    hash_to_hex(&in_point.txid)
                )
            });
            let input = entry
                .tx()
                .vin
                .get(in_point.input_index as usize)
                .unwrap_or_else(|| {
                    panic!(
                        "spent-output index input {} out of range for {}",
                        in_point.input_index,
                        hash_to_hex(&in_point.txid)
                    )
                });
            assert_eq!(
                input.prevout, *outpoint,
                "spent-output key disagrees with the input it maps to"
            );
        }
    }

    /// Writes the snapshot file under `data_dir`. Failures are logged and
    /// reported, never fatal: the snapshot is an optimization so a briefly
    /// restarted miner keeps a full pool, not a durability guarantee.
    pub fn write(&self, data_dir: &Path) -> bool {
        let inner = self.lock();
        match snapshot::write_snapshot(&inner, data_dir) {
            Ok(()) => true,
            Err(err) => {
                log_warn!("unable to write mempool snapshot: {err}");
                false
            }
        }
    }

    /// Reads a snapshot back: `Some(entries)` on success, where a missing
    /// file is success with no entries, and `None` once a failure has been
    /// logged. Restored entries carry `fee = 0`; the caller re-submits them
    /// through normal acceptance, which recomputes fees against current
    /// coins.
    pub fn read(data_dir: &Path) -> Option<Vec<MempoolEntry>> {
        match snapshot::read_snapshot(data_dir) {
            Ok(entries) => Some(entries),
            Err(err) => {
                log_warn!("unable to read mempool snapshot: {err}");
                None
            }
        }
    }
}

impl MempoolInner {
    fn bump(&mut self) {
        self.transactions_updated = self.transactions_updated.wrapping_add(1);
    }

    fn remove_into(&mut self, tx: &Transaction, recursive: bool, removed: &mut Vec<Transaction>) {
        let root = tx.txid();
        let mut order: Vec<Hash256> = Vec::new();
        if recursive {
            // Post-order walk of the consumer graph: the explicit stack keeps
            // arbitrarily long spend chains off the call stack, and the
            // visited set keeps the walk finite on any contents.
            let mut visited: HashSet<Hash256> = HashSet::new();
            let mut stack: Vec<(Hash256, bool)> = vec![(root, false)];
            while let Some((txid, children_done)) = stack.pop() {
                if children_done {
                    order.push(txid);
                    continue;
                }
                if !visited.insert(txid) {
                    continue;
                }
                stack.push((txid, true));
                let output_count = if txid == root {
                    tx.vout.len()
                } else {
                    self.map_tx
                        .get(&txid)
                        .map_or(0, |entry| entry.tx().vout.len())
                };
                for index in 0..output_count as u32 {
                    if let Some(consumer) = self.map_next_tx.get(&OutPoint::new(txid, index)) {
                        stack.push((consumer.txid, false));
                    }
                }
            }
        } else {
            order.push(root);
        }

        for txid in order {
            let Some(entry) = self.map_tx.remove(&txid) else {
                continue;
            };
            for input in &entry.tx().vin {
                self.map_next_tx.remove(&input.prevout);
            }
            removed.push(entry.into_tx());
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MempoolEntry;
    use xtd_chainstate::MemoryCoinsView;
    use xtd_primitives::transaction::{TxIn, TxOut};

    fn tx_spending(prevouts: &[OutPoint], outputs: usize) -> Transaction {
        Transaction {
            version: 1,
            vin: prevouts
                .iter()
                .map(|prevout| TxIn {
                    prevout: *prevout,
                    script_sig: vec![0x51],
                    sequence: u32::MAX,
                })
                .collect(),
            vout: (0..outputs)
                .map(|i| TxOut {
                    value: 50_000 - i as i64,
                    script_pubkey: vec![0x51],
                })
                .collect(),
            lock_time: 0,
        }
    }

    fn entry(tx: &Transaction) -> MempoolEntry {
        MempoolEntry::new(tx.clone(), 1_000, 1, 0.0, 100)
    }

    fn add(pool: &Mempool, tx: &Transaction) -> Hash256 {
        let txid = tx.txid();
        assert!(pool.add_unchecked(txid, entry(tx)));
        txid
    }

    #[test]
    fn insert_and_lookup() {
        let pool = Mempool::new();
        let base = OutPoint::new([0xaa; 32], 0);
        let tx = tx_spending(&[base], 1);
        let txid = add(&pool, &tx);

        assert!(pool.exists(&txid));
        assert_eq!(pool.lookup(&txid), Some(tx));
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.query_hashes(), vec![txid]);

        let inner = pool.lock();
        assert_eq!(
            inner.map_next_tx.get(&base),
            Some(&InPoint {
                txid,
                input_index: 0,
            })
        );
    }

    #[test]
    fn confirmed_conflict_evicts_the_loser() {
        let pool = Mempool::new();
        let contested = OutPoint::new([0xaa; 32], 0);
        let t1 = tx_spending(&[contested], 1);
        add(&pool, &t1);

        // A confirmed transaction claims the same outpoint with a different
        // output set.
        let t2 = tx_spending(&[contested], 2);
        assert_ne!(t1.txid(), t2.txid());

        let removed = pool.remove_conflicts(&t2);
        assert_eq!(removed, vec![t1]);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn remove_conflicts_spares_the_transaction_itself() {
        let pool = Mempool::new();
        let contested = OutPoint::new([0xaa; 32], 0);
        let t1 = tx_spending(&[contested], 1);
        let txid = add(&pool, &t1);

        assert!(pool.remove_conflicts(&t1).is_empty());
        assert!(pool.exists(&txid));
    }

    #[test]
    fn recursive_remove_reports_descendants_first() {
        let pool = Mempool::new();
        let t1 = tx_spending(&[OutPoint::new([0xaa; 32], 0)], 1);
        let t2 = tx_spending(&[OutPoint::new(t1.txid(), 0)], 1);
        let t3 = tx_spending(&[OutPoint::new(t2.txid(), 0)], 1);
        add(&pool, &t1);
        add(&pool, &t2);
        add(&pool, &t3);

        let removed = pool.remove(&t1, true);
        assert_eq!(removed, vec![t3.clone(), t2.clone(), t1.clone()]);
        assert_eq!(pool.size(), 0);

        let inner = pool.lock();
        assert!(inner.map_next_tx.is_empty());
    }

    #[test]
    fn non_recursive_remove_leaves_descendants() {
        let pool = Mempool::new();
        let t1 = tx_spending(&[OutPoint::new([0xaa; 32], 0)], 1);
        let t2 = tx_spending(&[OutPoint::new(t1.txid(), 0)], 1);
        add(&pool, &t1);
        let t2_id = add(&pool, &t2);

        let removed = pool.remove(&t1, false);
        assert_eq!(removed, vec![t1]);
        assert!(pool.exists(&t2_id));
    }

    #[test]
    fn remove_of_absent_tx_is_a_no_op() {
        let pool = Mempool::new();
        let stranger = tx_spending(&[OutPoint::new([0xbb; 32], 3)], 1);
        let before = pool.transactions_updated();

        assert!(pool.remove(&stranger, false).is_empty());
        assert_eq!(pool.transactions_updated(), before);
    }

    #[test]
    fn absent_root_still_loses_its_descendants() {
        let pool = Mempool::new();
        // The parent was confirmed in a block and never pooled; the child
        // spends one of its outputs from inside the pool.
        let parent = tx_spending(&[OutPoint::new([0xcc; 32], 0)], 2);
        let child = tx_spending(&[OutPoint::new(parent.txid(), 1)], 1);
        add(&pool, &child);

        let removed = pool.remove(&parent, true);
        assert_eq!(removed, vec![child]);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn clear_bumps_the_counter_even_when_empty() {
        let pool = Mempool::new();
        let before = pool.transactions_updated();
        pool.clear();
        assert_eq!(pool.transactions_updated(), before + 1);
    }

    #[test]
    fn counter_tracks_every_mutation() {
        let pool = Mempool::new();
        let t1 = tx_spending(&[OutPoint::new([0xaa; 32], 0)], 1);
        let t2 = tx_spending(&[OutPoint::new(t1.txid(), 0)], 1);

        add(&pool, &t1);
        assert_eq!(pool.transactions_updated(), 1);
        add(&pool, &t2);
        assert_eq!(pool.transactions_updated(), 2);

        pool.remove(&t1, true);
        assert_eq!(pool.transactions_updated(), 4);

        pool.add_transactions_updated(5);
        assert_eq!(pool.transactions_updated(), 9);
    }

    #[test]
    fn prune_spent_marks_consumed_outputs() {
        let pool = Mempool::new();
        let parent = tx_spending(&[OutPoint::new([0xaa; 32], 0)], 3);
        let parent_id = parent.txid();
        let consumer = tx_spending(
            &[OutPoint::new(parent_id, 0), OutPoint::new(parent_id, 2)],
            1,
        );
        add(&pool, &consumer);

        let mut coins = Coins::from_tx(&parent, 10);
        pool.prune_spent(&parent_id, &mut coins);

        assert!(!coins.is_available(0));
        assert!(coins.is_available(1));
        assert!(!coins.is_available(2));
    }

    #[test]
    fn prune_spent_without_consumers_is_a_no_op() {
        let pool = Mempool::new();
        let unrelated = tx_spending(&[OutPoint::new([0xdd; 32], 0)], 1);
        add(&pool, &unrelated);

        let parent = tx_spending(&[OutPoint::new([0xaa; 32], 0)], 2);
        let mut coins = Coins::from_tx(&parent, 10);
        let untouched = coins.clone();
        pool.prune_spent(&parent.txid(), &mut coins);
        assert_eq!(coins, untouched);
    }

    #[test]
    fn query_hashes_is_sorted() {
        let pool = Mempool::new();
        for seed in [0x90u8, 0x10, 0x50] {
            add(&pool, &tx_spending(&[OutPoint::new([seed; 32], 0)], 1));
        }
        let hashes = pool.query_hashes();
        let mut sorted = hashes.clone();
        sorted.sort();
        assert_eq!(hashes, sorted);
        assert_eq!(hashes.len(), 3);
    }

    #[test]
    fn sanity_check_accepts_a_consistent_pool() {
        let base = MemoryCoinsView::new();
        let confirmed = tx_spending(&[OutPoint::new([0x01; 32], 0)], 1);
        base.put_coins(confirmed.txid(), Coins::from_tx(&confirmed, 50));

        let pool = Mempool::new();
        pool.set_sanity_check(true);
        let t1 = tx_spending(&[OutPoint::new(confirmed.txid(), 0)], 1);
        let t2 = tx_spending(&[OutPoint::new(t1.txid(), 0)], 1);
        add(&pool, &t1);
        add(&pool, &t2);

        pool.check(&base);
    }

    #[test]
    fn sanity_check_is_a_no_op_when_disabled() {
        let pool = Mempool::new();
        let orphan = tx_spending(&[OutPoint::new([0x02; 32], 0)], 1);
        add(&pool, &orphan);
        // Inconsistent contents, but the flag is off.
        pool.check(&MemoryCoinsView::new());
    }

    #[test]
    #[should_panic(expected = "not found in coin view")]
    fn sanity_check_rejects_unknown_inputs() {
        let pool = Mempool::new();
        pool.set_sanity_check(true);
        let orphan = tx_spending(&[OutPoint::new([0x03; 32], 0)], 1);
        add(&pool, &orphan);
        pool.check(&MemoryCoinsView::new());
    }

    #[test]
    fn cross_index_invariants_hold_under_random_traffic() {
        // Deterministic pseudo-random add/remove traffic; after every step
        // the two indexes must mirror each other exactly.
        let mut state = 0x853c_49e6_748f_ea9bu64;
        let mut next = move |max: u64| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            state % max
        };

        let pool = Mempool::new();
        let mut live: Vec<Transaction> = Vec::new();
        for round in 0..200u64 {
            if live.is_empty() || next(3) > 0 {
                let prevout = if live.is_empty() || next(2) == 0 {
                    let mut hash = [0u8; 32];
                    hash[..8].copy_from_slice(&round.to_le_bytes());
                    OutPoint::new(hash, next(4) as u32)
                } else {
                    let parent = &live[next(live.len() as u64) as usize];
                    let index = next(parent.vout.len() as u64) as u32;
                    OutPoint::new(parent.txid(), index)
                };
                let inner = pool.lock();
                let taken = inner.map_next_tx.contains_key(&prevout);
                drop(inner);
                if taken {
                    continue;
                }
                let tx = tx_spending(&[prevout], 1 + next(3) as usize);
                add(&pool, &tx);
                live.push(tx);
            } else {
                let victim = live[next(live.len() as u64) as usize].clone();
                let removed = pool.remove(&victim, true);
                let gone: Vec<Hash256> = removed.iter().map(|tx| tx.txid()).collect();
                live.retain(|tx| !gone.contains(&tx.txid()));
            }

            let inner = pool.lock();
            let mut input_total = 0usize;
            for (txid, entry) in &inner.map_tx {
                for (input_index, input) in entry.tx().vin.iter().enumerate() {
                    input_total += 1;
                    assert_eq!(
                        inner.map_next_tx.get(&input.prevout),
                        Some(&InPoint {
                            txid: *txid,
                            input_index: input_index as u32,
                        })
                    );
                }
            }
            assert_eq!(inner.map_next_tx.len(), input_total);
            for (outpoint, in_point) in &inner.map_next_tx {
                let entry = inner.map_tx.get(&in_point.txid).expect("consumer exists");
                assert_eq!(
                    entry.tx().vin[in_point.input_index as usize].prevout,
                    *outpoint
                );
            }
        }
    }
}
