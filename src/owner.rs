use core::sync::atomic::{compiler_fence, AtomicUsize, Ordering};

use crate::cpu::CpuId;

/// The ownership slot of a mutex.
///
/// # Safety
///
/// [`try_claim`](Self::try_claim) must succeed for at most one context until the next
/// [`release`](Self::release). A successful claim must synchronize with the preceding release,
/// such that writes made by the previous owner are visible to the new owner.
pub unsafe trait AtomicOwnerCell {
    /// An empty slot.
    const NONE: Self;

    /// Returns the current owner.
    ///
    /// Only the owner itself may rely on the answer being up to date.
    fn owner(&self) -> Option<CpuId>;

    /// Atomically sets the owner to `cpu` if the slot is empty.
    ///
    /// Returns the current owner on failure.
    fn try_claim(&self, cpu: CpuId) -> Result<(), CpuId>;

    /// Sets the owner to `cpu` without an atomic read-modify-write.
    ///
    /// Only correct if no other processor can access the slot.
    fn claim_unshared(&self, cpu: CpuId);

    /// Empties the slot with release semantics.
    fn release(&self);
}

/// An [`AtomicOwnerCell`] storing the owner's [`CpuId`] in an [`AtomicUsize`].
#[derive(Debug)]
pub struct AtomicOwner {
    owner: AtomicUsize,
}

const NO_OWNER: usize = 0;

unsafe impl AtomicOwnerCell for AtomicOwner {
    #[allow(clippy::declare_interior_mutable_const)]
    const NONE: Self = Self {
        owner: AtomicUsize::new(NO_OWNER),
    };

    #[inline]
    fn owner(&self) -> Option<CpuId> {
        CpuId::from_raw(self.owner.load(Ordering::Relaxed))
    }

    #[inline]
    fn try_claim(&self, cpu: CpuId) -> Result<(), CpuId> {
        match self.owner.compare_exchange(
            NO_OWNER,
            cpu.into_raw(),
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => Ok(()),
            // The failed exchange observed a non-zero value.
            Err(raw) => Err(CpuId::from_raw(raw).unwrap_or(cpu)),
        }
    }

    #[inline]
    fn claim_unshared(&self, cpu: CpuId) {
        self.owner.store(cpu.into_raw(), Ordering::Relaxed);
        compiler_fence(Ordering::Acquire);
    }

    #[inline]
    fn release(&self) {
        self.owner.store(NO_OWNER, Ordering::Release);
    }
}

impl Default for AtomicOwner {
    fn default() -> Self {
        Self::NONE
    }
}
