use core::fmt;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::ipl::{self, InterruptLevelController, Ipl, SoftIpl};
use crate::mutex::IplMutex;

/// The identity of an execution context, as recorded in a mutex's owner slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct CpuId(NonZeroUsize);

impl CpuId {
    /// Returns the identity of the processor with the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is `usize::MAX`.
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        match NonZeroUsize::new(index.wrapping_add(1)) {
            Some(raw) => Self(raw),
            None => panic!("processor index out of range"),
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0.get() - 1
    }

    #[inline]
    pub(crate) const fn from_raw(raw: usize) -> Option<Self> {
        match NonZeroUsize::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[inline]
    pub(crate) const fn into_raw(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.index())
    }
}

/// The state of one processor that mutexes interact with.
///
/// A reference to the running processor's `CpuInfo` is passed into every mutex operation. It
/// carries the owner identity, the processor's interrupt priority level and the number of mutexes
/// the processor currently holds.
#[derive(Debug)]
pub struct CpuInfo<L = SoftIpl> {
    id: CpuId,
    spl: L,
    mutex_level: AtomicUsize,
}

impl<L> CpuInfo<L> {
    #[inline]
    pub const fn new(id: CpuId, spl: L) -> Self {
        Self {
            id,
            spl,
            mutex_level: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> CpuId {
        self.id
    }

    #[inline]
    pub fn spl(&self) -> &L {
        &self.spl
    }

    /// The number of mutexes this processor holds.
    ///
    /// Only maintained by [`Diagnostic`](crate::Diagnostic) mutexes.
    #[inline]
    pub fn mutex_level(&self) -> usize {
        self.mutex_level.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn mutex_acquired(&self) {
        self.mutex_level.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    #[track_caller]
    pub(crate) fn mutex_released(&self) {
        let level = self.mutex_level.load(Ordering::Relaxed);
        if level == 0 {
            panic!("{}: mutex level underflow", self.id);
        }
        self.mutex_level.store(level - 1, Ordering::Relaxed);
    }

    /// Asserts that this processor holds no mutexes and may therefore sleep.
    #[inline]
    #[track_caller]
    pub fn assert_wait_ok(&self) {
        let level = self.mutex_level();
        if level != 0 {
            panic!("{}: may not sleep while holding {level} mutexes", self.id);
        }
    }
}

impl<L: InterruptLevelController> CpuInfo<L> {
    /// The interrupt priority level in effect on this processor.
    #[inline]
    pub fn ipl(&self) -> Ipl {
        self.spl.current()
    }

    #[inline]
    pub fn splraise(&self, ipl: Ipl) -> Ipl {
        self.spl.raise(ipl)
    }

    #[inline]
    pub fn splx(&self, ipl: Ipl) {
        self.spl.restore(ipl);
    }

    /// See [`splassert`](crate::splassert).
    #[inline]
    #[track_caller]
    pub fn splassert(&self, want: Ipl) -> bool {
        ipl::splassert(&self.spl, want)
    }
}

/// All processors of a machine, indexed by hardware thread number.
#[derive(Debug)]
pub struct CpuTable<L, const N: usize> {
    cpus: [CpuInfo<L>; N],
}

impl<L, const N: usize> CpuTable<L, N> {
    /// Creates a table, calling `spl` for the interrupt level controller of each processor.
    pub fn new<F>(mut spl: F) -> Self
    where
        F: FnMut(usize) -> L,
    {
        let cpus =
            core::array::from_fn(|index| CpuInfo::new(CpuId::from_index(index), spl(index)));
        log::debug!("cpu table with {N} processors");
        Self { cpus }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&CpuInfo<L>> {
        self.cpus.get(index)
    }

    /// Returns the processor executing as hardware thread `index`.
    ///
    /// # Panics
    ///
    /// Panics if there is no such processor.
    #[inline]
    #[track_caller]
    pub fn resolve(&self, index: usize) -> &CpuInfo<L> {
        match self.get(index) {
            Some(cpu) => cpu,
            None => panic!("no processor with index {index}, have {N}"),
        }
    }

    /// Returns the processor currently owning `mutex`.
    pub fn owner_of<M: IplMutex>(&self, mutex: &M) -> Option<&CpuInfo<L>> {
        mutex.owner().and_then(|id| self.get(id.index()))
    }

    pub fn iter(&self) -> core::slice::Iter<'_, CpuInfo<L>> {
        self.cpus.iter()
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

impl<'a, L, const N: usize> IntoIterator for &'a CpuTable<L, N> {
    type Item = &'a CpuInfo<L>;
    type IntoIter = core::slice::Iter<'a, CpuInfo<L>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::spin::SpinIplMutex;

    #[test]
    fn ids() {
        let id = CpuId::from_index(3);
        assert_eq!(id.index(), 3);
        assert_eq!(id.to_string(), "cpu3");
        assert_eq!(CpuId::from_raw(id.into_raw()), Some(id));
        assert_eq!(CpuId::from_raw(0), None);
    }

    #[test]
    fn mutex_level() {
        let cpu = CpuInfo::new(CpuId::from_index(0), SoftIpl::new());
        cpu.assert_wait_ok();
        cpu.mutex_acquired();
        cpu.mutex_acquired();
        assert_eq!(cpu.mutex_level(), 2);
        cpu.mutex_released();
        cpu.mutex_released();
        assert_eq!(cpu.mutex_level(), 0);
        cpu.assert_wait_ok();
    }

    #[test]
    #[should_panic(expected = "cpu0: mutex level underflow")]
    fn mutex_level_underflow() {
        let cpu = CpuInfo::new(CpuId::from_index(0), SoftIpl::new());
        cpu.mutex_released();
    }

    #[test]
    #[should_panic(expected = "may not sleep while holding 1 mutexes")]
    fn wait_not_ok() {
        let cpu = CpuInfo::new(CpuId::from_index(1), SoftIpl::new());
        cpu.mutex_acquired();
        cpu.assert_wait_ok();
    }

    #[test]
    fn spl() {
        let cpu = CpuInfo::new(CpuId::from_index(0), SoftIpl::new());
        let s = cpu.splraise(Ipl::AUDIO);
        assert_eq!(s, Ipl::NONE);
        assert_eq!(cpu.ipl(), Ipl::AUDIO);
        assert!(cpu.splassert(Ipl::BIO));
        cpu.splx(s);
        assert_eq!(cpu.ipl(), Ipl::NONE);
    }

    #[test]
    fn table() {
        let table: CpuTable<SoftIpl, 4> = CpuTable::new(|_| SoftIpl::new());
        assert_eq!(table.len(), 4);
        assert!(!table.is_empty());
        for (index, cpu) in table.iter().enumerate() {
            assert_eq!(cpu.id().index(), index);
        }
        assert!(table.get(4).is_none());
        assert_eq!(table.resolve(2).id(), CpuId::from_index(2));
    }

    #[test]
    #[should_panic(expected = "no processor with index 7, have 2")]
    fn table_resolve_unknown() {
        let table: CpuTable<SoftIpl, 2> = CpuTable::new(|_| SoftIpl::new());
        table.resolve(7);
    }

    #[test]
    fn table_owner_of() {
        let table: CpuTable<SoftIpl, 2> = CpuTable::new(|_| SoftIpl::new());
        let mutex = SpinIplMutex::new(Ipl::NONE);
        assert!(table.owner_of(&mutex).is_none());

        mutex.enter(table.resolve(1));
        assert_eq!(table.owner_of(&mutex).map(CpuInfo::id), Some(CpuId::from_index(1)));
        mutex.leave(table.resolve(1));
        assert!(table.owner_of(&mutex).is_none());
    }
}
