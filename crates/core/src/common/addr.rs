//! Physical and Virtual Address types.
//!
//! This module defines strong types for physical and virtual addresses to
//! prevent accidental mixing of address spaces. It provides the following:
//! 1. **Type Safety:** Distinguishes the two address spaces at compile time.
//! 2. **Alignment:** Block-alignment helpers used by the fetch buffer and
//!    the cache access path.
//! 3. **MMU Integration:** Acts as the primary interface for translation.

/// A virtual address in the guest address space.
///
/// Virtual addresses are produced by the branch-prediction unit and must be
/// translated to physical addresses before the instruction cache is accessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtAddr(pub u64);

/// A physical address in the guest address space.
///
/// Physical addresses identify actual memory locations and are only valid
/// after a translation has completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub u64);

impl VirtAddr {
    /// Creates a new virtual address from a raw 64-bit value.
    #[inline(always)]
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub fn val(&self) -> u64 {
        self.0
    }

    /// Aligns the address down to the start of a `size`-byte block.
    ///
    /// `size` must be a power of two.
    #[inline(always)]
    pub fn align_down(self, size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        Self(self.0 & !(size as u64 - 1))
    }

    /// Returns the byte offset of the address within a `size`-byte block.
    #[inline(always)]
    pub fn block_offset(self, size: usize) -> u64 {
        debug_assert!(size.is_power_of_two());
        self.0 & (size as u64 - 1)
    }
}

impl PhysAddr {
    /// Creates a new physical address from a raw 64-bit value.
    #[inline(always)]
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub fn val(&self) -> u64 {
        self.0
    }

    /// Aligns the address down to the start of a `size`-byte block.
    ///
    /// `size` must be a power of two.
    #[inline(always)]
    pub fn align_down(self, size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        Self(self.0 & !(size as u64 - 1))
    }
}

/// Aligns a raw address down to the start of a `size`-byte block.
///
/// `size` must be a power of two. Applying the function twice yields the
/// same value as applying it once.
#[inline(always)]
pub fn align_down(addr: u64, size: usize) -> u64 {
    debug_assert!(size.is_power_of_two());
    addr & !(size as u64 - 1)
}
