//! Wire types shared across the node: consensus encoding, hashing,
//! outpoints, transactions, and blocks.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod outpoint;
pub mod transaction;
