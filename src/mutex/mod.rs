pub(crate) mod diagnostic;
pub(crate) mod spin;
pub(crate) mod uni;

use core::fmt;
use core::sync::atomic::Ordering;

use crate::cpu::{CpuId, CpuInfo};
use crate::ipl::{AtomicIpl, InterruptLevelController, Ipl};
use crate::owner::AtomicOwnerCell;

/// A mutex which raises the interrupt priority level of its owner.
///
/// The running processor is passed explicitly into every operation. Every successful
/// [`enter`](Self::enter) or [`enter_try`](Self::enter_try) must be paired with exactly one
/// [`leave`](Self::leave) on the same processor.
///
/// # Safety
///
/// Between a successful `enter` or `enter_try` and the matching `leave`, no other context may
/// successfully enter the mutex. Variants that rely on there being a single processor for this
/// must say so.
pub unsafe trait IplMutex {
    /// An unlocked mutex which does not change the interrupt priority level.
    const INIT: Self;

    /// Creates an unlocked mutex that raises its owner to `want`.
    ///
    /// [`Ipl::NONE`] leaves the level alone.
    fn new(want: Ipl) -> Self
    where
        Self: Sized;

    /// Reinitializes the mutex, clearing any name.
    fn init(&mut self, want: Ipl)
    where
        Self: Sized,
    {
        *self = Self::new(want);
    }

    /// Takes the mutex, spinning until it is available.
    fn enter<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>);

    /// Tries to take the mutex once.
    ///
    /// On failure, the processor's interrupt priority level is left untouched.
    fn enter_try<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) -> bool;

    /// Releases the mutex and restores the level it was taken at.
    fn leave<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>);

    /// The current owner.
    fn owner(&self) -> Option<CpuId>;

    /// The level in effect while held.
    fn want_ipl(&self) -> Ipl;

    /// The name given at creation, used in diagnostics.
    #[inline]
    fn name(&self) -> Option<&'static str> {
        None
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    /// Panics unless `cpu` holds the mutex.
    #[inline]
    #[track_caller]
    fn assert_locked<L>(&self, cpu: &CpuInfo<L>) {
        if self.owner() != Some(cpu.id()) {
            panic!("mutex {} not held in {}", Described(self), cpu.id());
        }
    }

    /// Panics if `cpu` holds the mutex.
    #[inline]
    #[track_caller]
    fn assert_unlocked<L>(&self, cpu: &CpuInfo<L>) {
        if self.owner() == Some(cpu.id()) {
            panic!("mutex {} held in {}", Described(self), cpu.id());
        }
    }
}

/// Formats a mutex by its name, or by its address if it has none.
pub(crate) struct Described<'a, M: ?Sized>(pub(crate) &'a M);

impl<M: IplMutex + ?Sized> fmt::Display for Described<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:p}", self.0),
        }
    }
}

/// The fields common to all mutex variants.
#[derive(Debug)]
pub(crate) struct MutexState<O> {
    pub(crate) owner: O,
    want_ipl: Ipl,
    saved_ipl: AtomicIpl,
    name: Option<&'static str>,
}

impl<O: AtomicOwnerCell> MutexState<O> {
    #[inline]
    pub(crate) const fn new(want_ipl: Ipl, name: Option<&'static str>) -> Self {
        Self {
            owner: O::NONE,
            want_ipl,
            saved_ipl: AtomicIpl::new(Ipl::NONE),
            name,
        }
    }

    #[inline]
    pub(crate) fn want_ipl(&self) -> Ipl {
        self.want_ipl
    }

    #[inline]
    pub(crate) fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Raises `cpu` to the mutex level, returning the level to restore later.
    #[inline]
    pub(crate) fn raise<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) -> Ipl {
        if self.want_ipl != Ipl::NONE {
            cpu.splraise(self.want_ipl)
        } else {
            Ipl::NONE
        }
    }

    /// Reverts [`raise`](Self::raise) after a failed attempt.
    #[inline]
    pub(crate) fn unraise<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>, s: Ipl) {
        if self.want_ipl != Ipl::NONE {
            cpu.splx(s);
        }
    }

    /// Records the level to restore. Only called by the new owner.
    #[inline]
    pub(crate) fn acquired(&self, s: Ipl) {
        if self.want_ipl != Ipl::NONE {
            self.saved_ipl.store(s, Ordering::Relaxed);
        }
    }

    /// Empties the owner slot and restores the saved level. Only called by the owner.
    #[inline]
    pub(crate) fn release<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) {
        // Read before the slot is emptied, the next owner overwrites it.
        let s = self.saved_ipl.load(Ordering::Relaxed);
        self.owner.release();
        if self.want_ipl != Ipl::NONE {
            cpu.splx(s);
        }
    }
}

/// The mutex selected by the `smp` and `diagnostic` features.
#[cfg(all(feature = "smp", feature = "diagnostic"))]
pub type KernelMutex = diagnostic::Diagnostic<spin::SpinIplMutex>;

/// The mutex selected by the `smp` and `diagnostic` features.
#[cfg(all(feature = "smp", not(feature = "diagnostic")))]
pub type KernelMutex = spin::SpinIplMutex;

/// The mutex selected by the `smp` and `diagnostic` features.
#[cfg(all(not(feature = "smp"), feature = "diagnostic"))]
pub type KernelMutex = diagnostic::Diagnostic<uni::UniIplMutex>;

/// The mutex selected by the `smp` and `diagnostic` features.
#[cfg(all(not(feature = "smp"), not(feature = "diagnostic")))]
pub type KernelMutex = uni::UniIplMutex;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipl::SoftIpl;

    #[test]
    fn kernel_mutex() {
        static M: KernelMutex = KernelMutex::new(Ipl::NET);
        let cpu = CpuInfo::new(CpuId::from_index(0), SoftIpl::new());

        M.enter(&cpu);
        M.assert_locked(&cpu);
        assert_eq!(cpu.ipl(), Ipl::NET);
        M.leave(&cpu);
        M.assert_unlocked(&cpu);
        assert_eq!(cpu.ipl(), Ipl::NONE);
    }

    #[test]
    #[should_panic(expected = "not held in cpu1")]
    fn assert_locked() {
        let cpu0 = CpuInfo::new(CpuId::from_index(0), SoftIpl::new());
        let cpu1 = CpuInfo::new(CpuId::from_index(1), SoftIpl::new());
        let m = spin::SpinIplMutex::new(Ipl::NONE);
        m.enter(&cpu0);
        m.assert_locked(&cpu1);
    }

    #[test]
    #[should_panic(expected = "held in cpu0")]
    fn assert_unlocked() {
        let cpu0 = CpuInfo::new(CpuId::from_index(0), SoftIpl::new());
        let m = uni::UniIplMutex::new(Ipl::NONE);
        m.enter(&cpu0);
        m.assert_unlocked(&cpu0);
    }

    #[test]
    #[should_panic(expected = "mutex bnxt_ring not held in cpu1")]
    fn assert_locked_named() {
        let cpu0 = CpuInfo::new(CpuId::from_index(0), SoftIpl::new());
        let cpu1 = CpuInfo::new(CpuId::from_index(1), SoftIpl::new());
        let m = spin::SpinIplMutex::named(Ipl::NET, "bnxt_ring");
        m.enter(&cpu0);
        m.assert_locked(&cpu1);
    }

    #[test]
    fn described() {
        let anonymous = uni::UniIplMutex::new(Ipl::NONE);
        assert_eq!(
            Described(&anonymous).to_string(),
            format!("{:p}", &anonymous)
        );
        let named = uni::UniIplMutex::named(Ipl::NONE, "kernel_lock");
        assert_eq!(Described(&named).to_string(), "kernel_lock");
        assert_eq!(named.name(), Some("kernel_lock"));
    }

    #[test]
    fn init() {
        let cpu = CpuInfo::new(CpuId::from_index(0), SoftIpl::new());
        let mut m = <spin::SpinIplMutex as IplMutex>::INIT;
        assert_eq!(m.want_ipl(), Ipl::NONE);

        m.init(Ipl::VM);
        assert_eq!(m.want_ipl(), Ipl::VM);
        assert!(!m.is_locked());

        assert!(m.enter_try(&cpu));
        assert_eq!(cpu.ipl(), Ipl::VM);
        m.leave(&cpu);
        assert_eq!(cpu.ipl(), Ipl::NONE);
    }
}
