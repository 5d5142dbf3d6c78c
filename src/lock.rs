use core::marker::PhantomData;

use lock_api::{GuardNoSend, RawMutex};

use crate::cpu::CpuInfo;
use crate::ipl::{InterruptLevelController, Ipl};
use crate::mutex::{IplMutex, KernelMutex};

/// Resolves the processor the caller runs on.
///
/// # Safety
///
/// Contexts that may run concurrently must resolve to processors with different
/// [`CpuId`](crate::CpuId)s. A context must resolve to the same processor from taking a lock
/// until releasing it. If the resolved processors are used with a mutex variant that assumes a
/// uniprocessor, only one context may run at a time.
pub unsafe trait CurrentCpu {
    type Spl: InterruptLevelController + 'static;

    fn current() -> &'static CpuInfo<Self::Spl>;
}

/// A [`lock_api::RawMutex`] on top of an [`IplMutex`], resolving the running processor with `C`.
///
/// Guards are not [`Send`], since a mutex must be left on the processor that entered it.
#[derive(Debug)]
pub struct RawCpuMutex<M, C> {
    inner: M,
    cpu: PhantomData<fn() -> C>,
}

impl<M, C> RawCpuMutex<M, C> {
    #[inline]
    pub const fn from_inner(inner: M) -> Self {
        Self {
            inner,
            cpu: PhantomData,
        }
    }

    #[inline]
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: IplMutex, C> RawCpuMutex<M, C> {
    /// Creates an unlocked mutex that raises its owner to `want`.
    #[inline]
    pub fn new(want: Ipl) -> Self {
        Self::from_inner(M::new(want))
    }
}

unsafe impl<M: IplMutex, C: CurrentCpu> RawMutex for RawCpuMutex<M, C> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::from_inner(M::INIT);

    type GuardMarker = GuardNoSend;

    #[inline]
    fn lock(&self) {
        self.inner.enter(C::current());
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.inner.enter_try(C::current())
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.inner.leave(C::current());
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

/// A [`lock_api::Mutex`] based on [`RawCpuMutex`].
pub type CpuMutex<C, T, M = KernelMutex> = lock_api::Mutex<RawCpuMutex<M, C>, T>;

/// A [`lock_api::MutexGuard`] based on [`RawCpuMutex`].
pub type CpuMutexGuard<'a, C, T, M = KernelMutex> =
    lock_api::MutexGuard<'a, RawCpuMutex<M, C>, T>;

/// A [`generic_once_cell::OnceCell`], initialized using [`RawCpuMutex`].
pub type CpuOnceCell<C, T, M = KernelMutex> = generic_once_cell::OnceCell<RawCpuMutex<M, C>, T>;

/// A [`generic_once_cell::Lazy`], initialized using [`RawCpuMutex`].
pub type CpuLazy<C, T, F = fn() -> T, M = KernelMutex> =
    generic_once_cell::Lazy<RawCpuMutex<M, C>, T, F>;

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;

    use crate::cpu::CpuId;
    use crate::ipl::SoftIpl;
    use crate::mutex::diagnostic::Diagnostic;
    use crate::mutex::spin::SpinIplMutex;

    /// Every thread is a processor of its own.
    struct ThreadCpu;

    static NEXT_CPU: AtomicUsize = AtomicUsize::new(0);

    std::thread_local! {
        static CPU: &'static CpuInfo = Box::leak(Box::new(CpuInfo::new(
            CpuId::from_index(NEXT_CPU.fetch_add(1, Ordering::Relaxed)),
            SoftIpl::new(),
        )));
    }

    unsafe impl CurrentCpu for ThreadCpu {
        type Spl = SoftIpl;

        fn current() -> &'static CpuInfo {
            CPU.with(|cpu| *cpu)
        }
    }

    type DiagSpin = Diagnostic<SpinIplMutex>;
    type TestMutex<T> = CpuMutex<ThreadCpu, T, DiagSpin>;

    #[test]
    fn smoke() {
        let m = TestMutex::new(());
        drop(m.lock());
        drop(m.lock());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn lots_and_lots() {
        static M: TestMutex<u32> = TestMutex::new(0);
        const J: u32 = 1000;
        const K: u32 = 3;

        fn inc() {
            for _ in 0..J {
                *M.lock() += 1;
            }
            assert_eq!(ThreadCpu::current().mutex_level(), 0);
        }

        let (tx, rx) = channel();
        for _ in 0..K {
            let tx2 = tx.clone();
            thread::spawn(move || {
                inc();
                tx2.send(()).unwrap();
            });
            let tx2 = tx.clone();
            thread::spawn(move || {
                inc();
                tx2.send(()).unwrap();
            });
        }

        drop(tx);
        for _ in 0..2 * K {
            rx.recv().unwrap();
        }
        assert_eq!(*M.lock(), J * K * 2);
    }

    #[test]
    fn guard_holds_ipl() {
        let m = TestMutex::from_raw(RawCpuMutex::new(Ipl::NET), 7);
        let cpu = ThreadCpu::current();

        {
            let guard = m.lock();
            assert_eq!(*guard, 7);
            assert_eq!(cpu.ipl(), Ipl::NET);
            assert_eq!(cpu.mutex_level(), 1);
            // Safety: the raw mutex is only inspected.
            unsafe { m.raw() }.inner().assert_locked(cpu);
        }

        assert_eq!(cpu.ipl(), Ipl::NONE);
        assert_eq!(cpu.mutex_level(), 0);
    }

    #[test]
    fn static_with_ipl() {
        static M: TestMutex<usize> =
            TestMutex::from_raw(RawCpuMutex::from_inner(DiagSpin::new(Ipl::TTY)), 0);

        *M.lock() += 1;
        let guard = M.lock();
        assert_eq!(*guard, 1);
        assert_eq!(ThreadCpu::current().ipl(), Ipl::TTY);
    }

    #[test]
    fn try_lock() {
        let mutex = Arc::new(TestMutex::new(42));

        // First lock succeeds
        let a = mutex.try_lock();
        assert_eq!(a.as_ref().map(|r| **r), Some(42));

        // Another processor fails
        let other = mutex.clone();
        let b = thread::spawn(move || other.try_lock().is_none())
            .join()
            .unwrap();
        assert!(b);

        // After dropping lock, it succeeds again
        drop(a);
        let c = mutex.try_lock();
        assert_eq!(c.as_ref().map(|r| **r), Some(42));
    }

    #[test]
    #[should_panic(expected = "locking against myself")]
    fn relock_panics() {
        let m = TestMutex::new(());
        let _a = m.lock();
        let _b = m.lock();
    }

    #[test]
    fn test_mutex_arc_nested() {
        let arc = Arc::new(TestMutex::new(1));
        let arc2 = Arc::new(TestMutex::new(arc));
        let (tx, rx) = channel();
        let _t = thread::spawn(move || {
            let lock = arc2.lock();
            let lock2 = lock.lock();
            assert_eq!(*lock2, 1);
            assert_eq!(ThreadCpu::current().mutex_level(), 2);
            tx.send(()).unwrap();
        });
        rx.recv().unwrap();
    }

    #[test]
    fn once_cell() {
        static CELL: CpuOnceCell<ThreadCpu, usize, DiagSpin> = CpuOnceCell::new();

        let handles: Vec<_> = (0..4)
            .map(|i| thread::spawn(move || *CELL.get_or_init(|| i)))
            .collect();
        let values: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(values.iter().all(|v| *v == values[0]));
    }

    #[test]
    fn lazy() {
        type Names = Vec<&'static str>;
        static LAZY: CpuLazy<ThreadCpu, Names, fn() -> Names, DiagSpin> =
            CpuLazy::new(|| vec!["ferris", "hermit"]);

        assert_eq!(LAZY.len(), 2);
        assert_eq!(LAZY[0], "ferris");
        assert_eq!(ThreadCpu::current().mutex_level(), 0);
    }
}
