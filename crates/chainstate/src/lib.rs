//! Confirmed-chain state seams consumed by validation.

pub mod coins;

pub use coins::{Coins, CoinsView, MemoryCoinsView};
