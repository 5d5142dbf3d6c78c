use crate::cpu::{CpuId, CpuInfo};
use crate::ipl::{InterruptLevelController, Ipl};
use crate::mutex::{Described, IplMutex, MutexState};
use crate::owner::{AtomicOwner, AtomicOwnerCell};

/// A mutex for uniprocessors.
///
/// With a single processor, raising the interrupt priority level already provides exclusion. The
/// owner slot is only kept to detect a processor entering a mutex it already holds, which would
/// deadlock on a multiprocessor.
///
/// Must not be shared between processors.
#[derive(Debug)]
pub struct UniIplMutex<O = AtomicOwner> {
    state: MutexState<O>,
}

impl UniIplMutex {
    /// Creates an unlocked mutex that raises its owner to `want`.
    #[inline]
    pub const fn new(want: Ipl) -> Self {
        Self::with_ipl(want)
    }

    /// Creates an unlocked mutex that raises its owner to `want`, named `name` in diagnostics.
    #[inline]
    pub const fn named(want: Ipl, name: &'static str) -> Self {
        Self::with_name(want, Some(name))
    }
}

impl<O: AtomicOwnerCell> UniIplMutex<O> {
    /// Like [`UniIplMutex::new`], for any owner slot.
    #[inline]
    pub const fn with_ipl(want: Ipl) -> Self {
        Self::with_name(want, None)
    }

    /// Like [`UniIplMutex::named`], with an optional name.
    #[inline]
    pub const fn with_name(want: Ipl, name: Option<&'static str>) -> Self {
        Self {
            state: MutexState::new(want, name),
        }
    }
}

unsafe impl<O: AtomicOwnerCell> IplMutex for UniIplMutex<O> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::with_ipl(Ipl::NONE);

    #[inline]
    fn new(want: Ipl) -> Self {
        Self::with_ipl(want)
    }

    #[track_caller]
    fn enter<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) {
        let s = self.state.raise(cpu);
        match self.state.owner.owner() {
            None => {}
            Some(owner) if owner == cpu.id() => {
                panic!("mutex {}: locking against myself", Described(self))
            }
            Some(owner) => panic!(
                "mutex {}: held by {owner} on a uniprocessor",
                Described(self)
            ),
        }
        self.state.owner.claim_unshared(cpu.id());
        self.state.acquired(s);
    }

    #[inline]
    fn enter_try<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) -> bool {
        let s = self.state.raise(cpu);
        if self.state.owner.owner().is_some() {
            self.state.unraise(cpu, s);
            return false;
        }
        self.state.owner.claim_unshared(cpu.id());
        self.state.acquired(s);
        true
    }

    #[inline]
    fn leave<L: InterruptLevelController>(&self, cpu: &CpuInfo<L>) {
        self.state.release(cpu);
    }

    #[inline]
    fn owner(&self) -> Option<CpuId> {
        self.state.owner.owner()
    }

    #[inline]
    fn want_ipl(&self) -> Ipl {
        self.state.want_ipl()
    }

    #[inline]
    fn name(&self) -> Option<&'static str> {
        self.state.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipl::SoftIpl;

    fn cpu() -> CpuInfo {
        CpuInfo::new(CpuId::from_index(0), SoftIpl::new())
    }

    #[test]
    fn smoke() {
        let cpu = cpu();
        let m = UniIplMutex::new(Ipl::CLOCK);
        m.enter(&cpu);
        assert_eq!(m.owner(), Some(cpu.id()));
        assert_eq!(cpu.ipl(), Ipl::CLOCK);
        m.leave(&cpu);
        assert_eq!(m.owner(), None);
        assert_eq!(cpu.ipl(), Ipl::NONE);
    }

    #[test]
    #[should_panic(expected = "locking against myself")]
    fn locking_against_myself() {
        let cpu = cpu();
        let m = UniIplMutex::new(Ipl::NONE);
        m.enter(&cpu);
        m.enter(&cpu);
    }

    #[test]
    #[should_panic(expected = "held by cpu1 on a uniprocessor")]
    fn foreign_owner() {
        let m = UniIplMutex::new(Ipl::NONE);
        m.enter(&CpuInfo::new(CpuId::from_index(1), SoftIpl::new()));
        m.enter(&cpu());
    }

    #[test]
    #[should_panic(expected = "mutex sc_mtx: locking against myself")]
    fn named_locking_against_myself() {
        let cpu = cpu();
        let m = UniIplMutex::named(Ipl::BIO, "sc_mtx");
        m.enter(&cpu);
        m.enter(&cpu);
    }

    #[test]
    fn enter_try_fails_without_side_effects() {
        let cpu = cpu();
        let m = UniIplMutex::new(Ipl::VM);
        assert!(m.enter_try(&cpu));
        assert_eq!(cpu.ipl(), Ipl::VM);

        // A second attempt fails and keeps the raised level.
        assert!(!m.enter_try(&cpu));
        assert_eq!(cpu.ipl(), Ipl::VM);
        assert_eq!(m.owner(), Some(cpu.id()));

        m.leave(&cpu);
        assert_eq!(cpu.ipl(), Ipl::NONE);

        cpu.splx(Ipl::SOFTCLOCK);
        m.enter(&cpu);
        assert!(!m.enter_try(&cpu));
        m.leave(&cpu);
        assert_eq!(cpu.ipl(), Ipl::SOFTCLOCK);
    }

    #[test]
    fn nested() {
        let cpu = cpu();
        let bio = UniIplMutex::new(Ipl::BIO);
        let high = UniIplMutex::new(Ipl::HIGH);

        bio.enter(&cpu);
        high.enter(&cpu);
        assert_eq!(cpu.ipl(), Ipl::HIGH);
        high.leave(&cpu);
        assert_eq!(cpu.ipl(), Ipl::BIO);
        bio.leave(&cpu);
        assert_eq!(cpu.ipl(), Ipl::NONE);
    }
}
