//! Locked memory pages backing sensitive key material.
//!
//! Wallet code pins the pages holding private keys so they never reach swap.
//! Ranges from different allocations share pages, so the manager refcounts
//! at page granularity and only issues one OS call per page transition.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Platform page-pinning primitive.
pub trait PageLocker {
    /// Pins `[addr, addr + len)` into physical memory.
    fn lock(&self, addr: usize, len: usize) -> bool;
    /// Releases a previously pinned range.
    fn unlock(&self, addr: usize, len: usize) -> bool;
}

/// `mlock`/`munlock`-backed page locker.
pub struct MemoryPageLocker;

#[cfg(unix)]
impl PageLocker for MemoryPageLocker {
    fn lock(&self, addr: usize, len: usize) -> bool {
        unsafe { libc::mlock(addr as *const libc::c_void, len) == 0 }
    }

    fn unlock(&self, addr: usize, len: usize) -> bool {
        unsafe { libc::munlock(addr as *const libc::c_void, len) == 0 }
    }
}

#[cfg(not(unix))]
impl PageLocker for MemoryPageLocker {
    fn lock(&self, _addr: usize, _len: usize) -> bool {
        false
    }

    fn unlock(&self, _addr: usize, _len: usize) -> bool {
        false
    }
}

/// Determine system page size in bytes.
pub fn system_page_size() -> usize {
    #[cfg(unix)]
    {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    4096
}

/// Page-granular lock bookkeeping over some [`PageLocker`].
pub struct LockedPageManager<L> {
    locker: L,
    page_size: usize,
    page_mask: usize,
    histogram: Mutex<HashMap<usize, usize>>,
}

impl<L: PageLocker> LockedPageManager<L> {
    pub fn new(locker: L, page_size: usize) -> Self {
        assert!(
            page_size.is_power_of_two(),
            "page size must be a power of two"
        );
        Self {
            locker,
            page_size,
            page_mask: !(page_size - 1),
            histogram: Mutex::new(HashMap::new()),
        }
    }

    /// Pins every page overlapping `[addr, addr + len)`. Returns false when
    /// any page could not be locked; bookkeeping stays balanced either way.
    pub fn lock_range(&self, addr: usize, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        let mut histogram = self.histogram.lock().expect("page histogram lock");
        let mut ok = true;
        let end = addr.saturating_add(len - 1) & self.page_mask;
        let mut page = addr & self.page_mask;
        loop {
            let count = histogram.entry(page).or_insert(0);
            if *count == 0 && !self.locker.lock(page, self.page_size) {
                ok = false;
            }
            *count += 1;
            if page == end {
                break;
            }
            page += self.page_size;
        }
        ok
    }

    /// Reverses one `lock_range` call over the same range. Pages whose count
    /// reaches zero are released to the OS. Unlocking a range that was never
    /// locked is a programmer error.
    pub fn unlock_range(&self, addr: usize, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        let mut histogram = self.histogram.lock().expect("page histogram lock");
        let mut ok = true;
        let end = addr.saturating_add(len - 1) & self.page_mask;
        let mut page = addr & self.page_mask;
        loop {
            match histogram.get_mut(&page) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    histogram.remove(&page);
                    if !self.locker.unlock(page, self.page_size) {
                        ok = false;
                    }
                }
                None => {
                    debug_assert!(false, "unlocking a page that was never locked");
                    ok = false;
                }
            }
            if page == end {
                break;
            }
            page += self.page_size;
        }
        ok
    }

    /// Number of distinct pages currently pinned.
    pub fn locked_page_count(&self) -> usize {
        self.histogram.lock().expect("page histogram lock").len()
    }
}

/// The process-wide manager, initialized on first use and never torn down:
/// locked pages live as long as the process that locked them.
pub fn locked_page_manager() -> &'static LockedPageManager<MemoryPageLocker> {
    static INSTANCE: OnceLock<LockedPageManager<MemoryPageLocker>> = OnceLock::new();
    INSTANCE.get_or_init(|| LockedPageManager::new(MemoryPageLocker, system_page_size()))
}
