//! Process support utilities.

pub mod pagelocker;

pub use pagelocker::{
    locked_page_manager, system_page_size, LockedPageManager, MemoryPageLocker, PageLocker,
};
