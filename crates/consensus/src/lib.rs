//! Consensus constants and network rules.

pub mod constants;

pub use constants::{
    check_block_size, max_block_size, max_block_sigops, CLIENT_VERSION, COINBASE_MATURITY,
    LOCKTIME_THRESHOLD, MAX_TRANSACTION_SIZE, PROTOCOL_VERSION, TWENTY_MEG_FORK_TIME,
};

pub type Hash256 = [u8; 32];
