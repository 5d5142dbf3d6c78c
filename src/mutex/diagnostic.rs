use crate::cpu::{CpuId, CpuInfo};
use crate::ipl::{InterruptLevelController, Ipl};
use crate::mutex::spin::SpinIplMutex;
use crate::mutex::uni::UniIplMutex;
use crate::mutex::{Described, IplMutex};
use crate::owner::AtomicOwnerCell;

/// A mutex checking that it is used correctly.
///
/// Wraps another [`IplMutex`] and panics if
/// * a processor enters a mutex it already holds,
/// * a processor leaves a mutex it does not hold, or
/// * the interrupt priority level has dropped below the mutex level by the time it is left,
///   which happens if nested mutexes are left out of order.
///
/// Also maintains [`CpuInfo::mutex_level`].
#[derive(Debug)]
pub struct Diagnostic<M> {
    inner: M,
}

impl<M> Diagnostic<M> {
    #[inline]
    pub const fn wrap(inner: M) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn into_inner(self) -> M {
        self.inner
    }

    #[inline]
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<W, O: AtomicOwnerCell> Diagnostic<SpinIplMutex<W, O>> {
    /// Creates an unlocked mutex that raises its owner to `want`.
    #[inline]
    pub const fn new(want: Ipl) -> Self {
        Self::wrap(SpinIplMutex::with_ipl(want))
    }

    /// Creates an unlocked mutex that raises its owner to `want`, named `name` in diagnostics.
    #[inline]
    pub const fn named(want: Ipl, name: &'static str) -> Self {
        Self::wrap(SpinIplMutex::with_name(want, Some(name)))
    }
}

impl<O: AtomicOwnerCell> Diagnostic<UniIplMutex<O>> {
    /// Creates an unlocked mutex that raises its owner to `want`.
    #[inline]
    pub const fn new(want: Ipl) -> Self {
        Self::wrap(UniIplMutex::with_ipl(want))
    }

    /// Creates an unlocked mutex that raises its owner to `want`, named `name` in diagnostics.
    #[inline]
    pub const fn named(want: Ipl, name: &'static str) -> Self {
        Self::wrap(UniIplMutex::with_name(want, Some(name)))
    }
}

impl<M: IplMutex> Diagnostic<M> {
    #[inline]
    #[track_caller]
    fn assert_not_owner<L>(&self, cpu: &CpuInfo<L>) {
        if self.inner.owner() == Some(cpu.id()) {
            panic!("mutex {}: locking against myself", Described(self));
        }
    }
}

unsafe impl<M: IplMutex> IplMutex for Diagnostic<M> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self { inner: M::INIT };

    #[inline]
    fn new(want: Ipl) -> Self {
        Self::wrap(M::new(want))
    }

    #[inline]
    #[track_caller]
    fn enter<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) {
        self.assert_not_owner(cpu);
        self.inner.enter(cpu);
        cpu.mutex_acquired();
    }

    #[inline]
    #[track_caller]
    fn enter_try<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) -> bool {
        self.assert_not_owner(cpu);
        let ok = self.inner.enter_try(cpu);
        if ok {
            cpu.mutex_acquired();
        }
        ok
    }

    #[inline]
    #[track_caller]
    fn leave<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) {
        match self.inner.owner() {
            Some(owner) if owner == cpu.id() => {}
            Some(owner) => panic!(
                "mutex {}: held by {owner}, left by {}",
                Described(self),
                cpu.id()
            ),
            None => panic!("mutex {}: not held", Described(self)),
        }

        let want = self.inner.want_ipl();
        let have = cpu.ipl();
        if have < want {
            panic!(
                "mutex {}: left at {have} below its level {want}",
                Described(self)
            );
        }

        cpu.mutex_released();
        self.inner.leave(cpu);
    }

    #[inline]
    fn owner(&self) -> Option<CpuId> {
        self.inner.owner()
    }

    #[inline]
    fn want_ipl(&self) -> Ipl {
        self.inner.want_ipl()
    }

    #[inline]
    fn name(&self) -> Option<&'static str> {
        self.inner.name()
    }
}
