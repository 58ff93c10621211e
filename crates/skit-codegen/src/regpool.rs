//! Register allocation within one bank.
//!
//! A bitmap of in-use registers with first-fit allocation. Vectors need
//! contiguous runs of two or three float registers, so acquisition takes a
//! count. The high-water mark becomes the bank's register count in the
//! compiled function.

/// Allocator for one register bank.
#[derive(Debug, Default)]
pub struct RegPool {
    used: Vec<bool>,
    high_water: u16,
}

impl RegPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `count` contiguous registers, returning the first index.
    pub fn acquire(&mut self, count: u16) -> u16 {
        debug_assert!(count >= 1 && count <= 3);
        let count = count as usize;
        let mut start = 0;
        while start + count <= self.used.len() {
            if self.used[start..start + count].iter().all(|u| !u) {
                for slot in &mut self.used[start..start + count] {
                    *slot = true;
                }
                return start as u16;
            }
            start += 1;
        }
        // No free run; extend at the end past any tail that is partly used.
        let base = self.used.len();
        self.used.resize(base + count, true);
        self.high_water = self.high_water.max(self.used.len() as u16);
        base as u16
    }

    /// Releases a run previously returned by [`acquire`](Self::acquire).
    pub fn release(&mut self, first: u16, count: u16) {
        let first = first as usize;
        let count = count as usize;
        debug_assert!(first + count <= self.used.len());
        for slot in &mut self.used[first..first + count] {
            debug_assert!(*slot, "double free of register");
            *slot = false;
        }
    }

    /// Marks the first `count` registers as permanently used (parameters
    /// occupy the low registers of their banks).
    pub fn reserve_low(&mut self, count: u16) {
        let count = count as usize;
        if self.used.len() < count {
            self.used.resize(count, false);
        }
        for slot in &mut self.used[..count] {
            *slot = true;
        }
        self.high_water = self.high_water.max(count as u16);
    }

    /// Highest register count ever in use; sizes the bank at runtime.
    #[inline]
    pub fn high_water(&self) -> u16 {
        self.high_water
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_after_release() {
        let mut pool = RegPool::new();
        let a = pool.acquire(1);
        let b = pool.acquire(1);
        assert_ne!(a, b);
        pool.release(a, 1);
        let c = pool.acquire(1);
        assert_eq!(a, c);
        assert_eq!(pool.high_water(), 2);
    }

    #[test]
    fn test_contiguous_runs() {
        let mut pool = RegPool::new();
        let s = pool.acquire(1);
        let v = pool.acquire(3);
        // The run must not overlap the scalar.
        assert!(v > s || v + 3 <= s);
        pool.release(s, 1);
        // A single free register is not enough for a vec2.
        let v2 = pool.acquire(2);
        assert_ne!(v2, s);
        let s2 = pool.acquire(1);
        assert_eq!(s2, s);
    }

    #[test]
    fn test_reserve_low() {
        let mut pool = RegPool::new();
        pool.reserve_low(3);
        assert_eq!(pool.acquire(1), 3);
        assert_eq!(pool.high_water(), 4);
    }
}
