//! Transaction memory pool: validated-but-unconfirmed transactions staged
//! for block inclusion, plus the coin-view overlay validators read through.

pub mod entry;
pub mod pool;
mod snapshot;
pub mod view;

pub use entry::{MempoolEntry, MEMPOOL_HEIGHT};
pub use pool::{InPoint, Mempool};
pub use view::MempoolCoinsView;
