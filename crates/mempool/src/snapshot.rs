//! On-disk pool snapshot (`mempool.dat`).
//!
//! Layout: two u32 version fields (required-to-read, written-by), a u64
//! entry count, then per entry the network-encoded transaction followed by
//! fee (i64), arrival time (i64), priority at entry height (f64), and entry
//! height (u32). Entries appear parents-before-dependents so a reader can
//! replay the file through normal acceptance without dangling in-pool
//! references.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use xtd_consensus::{Hash256, CLIENT_VERSION};
use xtd_primitives::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use xtd_primitives::transaction::Transaction;

use crate::entry::MempoolEntry;
use crate::pool::MempoolInner;

const MEMPOOL_FILE_NAME: &str = "mempool.dat";

#[derive(Debug)]
pub(crate) enum SnapshotError {
    Io(io::Error),
    Decode(DecodeError),
    UpVersion(u32),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io(err) => write!(f, "snapshot i/o: {err}"),
            SnapshotError::Decode(err) => write!(f, "snapshot decode: {err}"),
            SnapshotError::UpVersion(version) => {
                write!(f, "snapshot requires client version {version}")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<io::Error> for SnapshotError {
    fn from(err: io::Error) -> Self {
        SnapshotError::Io(err)
    }
}

impl From<DecodeError> for SnapshotError {
    fn from(err: DecodeError) -> Self {
        SnapshotError::Decode(err)
    }
}

pub(crate) fn write_snapshot(inner: &MempoolInner, data_dir: &Path) -> Result<(), SnapshotError> {
    let mut encoder = Encoder::new();
    encoder.write_u32_le(CLIENT_VERSION); // version required to read
    encoder.write_u32_le(CLIENT_VERSION); // version that wrote
    encoder.write_u64_le(inner.map_tx.len() as u64);

    let mut txids: Vec<Hash256> = inner.map_tx.keys().copied().collect();
    txids.sort();
    let mut written: HashSet<Hash256> = HashSet::new();
    let mut visiting: HashSet<Hash256> = HashSet::new();
    for txid in &txids {
        write_entry(inner, txid, &mut written, &mut visiting, &mut encoder);
    }

    write_file_atomic(&data_dir.join(MEMPOOL_FILE_NAME), &encoder.into_inner())?;
    Ok(())
}

// Post-order over the in-pool dependency graph: parents land in the file
// before anything that spends them. A healthy pool cannot hold a dependency
// cycle; the `visiting` set turns one into a debug assertion instead of
// unbounded recursion.
fn write_entry(
    inner: &MempoolInner,
    txid: &Hash256,
    written: &mut HashSet<Hash256>,
    visiting: &mut HashSet<Hash256>,
    encoder: &mut Encoder,
) {
    if written.contains(txid) {
        return;
    }
    if !visiting.insert(*txid) {
        debug_assert!(false, "cycle in mempool dependency graph");
        return;
    }
    if let Some(entry) = inner.map_tx.get(txid) {
        for input in &entry.tx().vin {
            let parent = input.prevout.hash;
            if inner.map_tx.contains_key(&parent) {
                write_entry(inner, &parent, written, visiting, encoder);
            }
        }
        entry.tx().consensus_encode(encoder);
        encoder.write_i64_le(entry.fee());
        encoder.write_i64_le(entry.time());
        encoder.write_f64_le(entry.priority(entry.height()));
        encoder.write_u32_le(entry.height());
        written.insert(*txid);
    }
    visiting.remove(txid);
}

pub(crate) fn read_snapshot(data_dir: &Path) -> Result<Vec<MempoolEntry>, SnapshotError> {
    let bytes = match fs::read(data_dir.join(MEMPOOL_FILE_NAME)) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut decoder = Decoder::new(&bytes);
    let version_required = decoder.read_u32_le()?;
    if version_required > CLIENT_VERSION {
        return Err(SnapshotError::UpVersion(version_required));
    }
    let _version_that_wrote = decoder.read_u32_le()?;
    let count = decoder.read_u64_le()?;

    let mut entries = Vec::new();
    for _ in 0..count {
        let tx = Transaction::consensus_decode(&mut decoder)?;
        let _fee = decoder.read_i64_le()?;
        let time = decoder.read_i64_le()?;
        let priority = decoder.read_f64_le()?;
        let height = decoder.read_u32_le()?;
        // The fee on disk is deliberately discarded: re-acceptance computes
        // it fresh against current coins.
        entries.push(MempoolEntry::new(tx, 0, time, priority, height));
    }
    Ok(entries)
}

fn write_file_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("dat.tmp");
    fs::write(&tmp, bytes)?;
    if fs::rename(&tmp, path).is_err() {
        let _ = fs::remove_file(path);
        fs::rename(&tmp, path)?;
    }
    Ok(())
}
