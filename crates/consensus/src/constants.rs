//! Consensus-wide constants shared across validation.

/// Timestamp of the big-block hard fork: 1 March 2016 00:00:00 UTC.
pub const TWENTY_MEG_FORK_TIME: u64 = 1_456_790_400;

/// The maximum allowed size for a serialized block, in bytes (network rule).
///
/// 1MB until the fork timestamp, 20MB afterwards.
pub fn max_block_size(block_timestamp: u64) -> u32 {
    if block_timestamp < TWENTY_MEG_FORK_TIME {
        1_000_000
    } else {
        20_000_000
    }
}

/// The maximum allowed number of signature check operations in a block
/// (network rule).
pub fn max_block_sigops(block_timestamp: u64) -> u32 {
    max_block_size(block_timestamp) / 50
}

/// Whether a serialized block fits the size limit in force at
/// `block_timestamp`.
pub fn check_block_size(serialized_size: u64, block_timestamp: u64) -> bool {
    serialized_size <= u64::from(max_block_size(block_timestamp))
}

/// The maximum allowed size for a serialized transaction, in bytes.
pub const MAX_TRANSACTION_SIZE: u32 = 1_000_000;

/// Coinbase transaction outputs can only be spent after this number of new
/// blocks (network rule).
pub const COINBASE_MATURITY: i32 = 100;

/// Threshold for `lock_time`: below this value it is interpreted as a block
/// height, at or above as a UNIX timestamp.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Current network protocol version for P2P messages.
pub const PROTOCOL_VERSION: i32 = 70_002;

/// Version stamped into files written by this client.
pub const CLIENT_VERSION: u32 = 100_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_before_fork() {
        assert_eq!(max_block_size(TWENTY_MEG_FORK_TIME - 1), 1_000_000);
        assert_eq!(max_block_sigops(TWENTY_MEG_FORK_TIME - 1), 20_000);
    }

    #[test]
    fn block_size_at_fork() {
        assert_eq!(max_block_size(TWENTY_MEG_FORK_TIME), 20_000_000);
        assert_eq!(max_block_sigops(TWENTY_MEG_FORK_TIME), 400_000);
    }

    #[test]
    fn block_size_gate_boundaries() {
        assert!(check_block_size(1_000_000, TWENTY_MEG_FORK_TIME - 1));
        assert!(!check_block_size(1_000_001, TWENTY_MEG_FORK_TIME - 1));
        assert!(!check_block_size(20_000_000, TWENTY_MEG_FORK_TIME - 1));
        assert!(check_block_size(1_000_000, TWENTY_MEG_FORK_TIME));
        assert!(check_block_size(20_000_000, TWENTY_MEG_FORK_TIME));
        assert!(!check_block_size(20_000_001, TWENTY_MEG_FORK_TIME));
    }

    #[test]
    fn block_size_long_after_fork() {
        let year_after = TWENTY_MEG_FORK_TIME + 60 * 60 * 24 * 365;
        assert_eq!(max_block_size(year_after), 20_000_000);
        assert!(check_block_size(20_000_000, year_after));
        assert!(!check_block_size(20_000_001, year_after));
    }
}
