//! # Overview
//!
//! ipl-mutex provides the kernel mutex: mutual exclusion between processors and interrupt handlers
//! for short critical sections, built from an atomic owner slot and the processor's
//! [interrupt priority level] (IPL).
//!
//! # Interrupt Priority Levels
//!
//! [`Ipl`] is a validated level, from [`Ipl::NONE`] to [`Ipl::HIGH`].
//! Each processor's level is driven through an [`InterruptLevelController`]:
//! * [`SoftIpl`] keeps the level in software only.
//! * [`HardwareIpl`] additionally masks interrupts on the processor while the level is raised.
//!
//! [`with_ipl`] runs a closure at a raised level and [`splassert`] checks that the level is high
//! enough.
//!
//! # Mutexes
//!
//! Every mutex implements [`IplMutex`], taking the running processor's [`CpuInfo`] as an explicit
//! argument:
//! * [`SpinIplMutex`] is a [test and test-and-set] [spinlock] for multiprocessors.
//! * [`UniIplMutex`] is for uniprocessors, where raising the level is enough and the owner is only
//!   tracked to detect a processor locking against itself.
//! * [`Diagnostic`] wraps either and panics on misuse. It also counts the mutexes held by each
//!   processor.
//!
//! While held, a mutex keeps its owner at the level it was created with, and restores the previous
//! level when left.
//! Mutexes created with `named` report their name instead of their address when they panic.
//!
//! [interrupt priority level]: https://en.wikipedia.org/wiki/Interrupt_priority_level
//! [test and test-and-set]: https://en.wikipedia.org/wiki/Test_and_test-and-set
//! [spinlock]: https://en.wikipedia.org/wiki/Spinlock
//!
//! ## Examples
//!
//! ```
//! use ipl_mutex::{CpuId, CpuInfo, Diagnostic, IplMutex, Ipl, SoftIpl, SpinIplMutex};
//!
//! static MUTEX: Diagnostic<SpinIplMutex> = Diagnostic::<SpinIplMutex>::new(Ipl::NET);
//!
//! let cpu = CpuInfo::new(CpuId::from_index(0), SoftIpl::new());
//!
//! MUTEX.enter(&cpu);
//! assert_eq!(cpu.ipl(), Ipl::NET);
//! assert_eq!(cpu.mutex_level(), 1);
//! MUTEX.leave(&cpu);
//!
//! assert_eq!(cpu.ipl(), Ipl::NONE);
//! assert_eq!(cpu.mutex_level(), 0);
//! ```
//!
//! # Build Configuration
//!
//! [`KernelMutex`] is the mutex selected by the `smp` and `diagnostic` features:
//!
//! | `smp` | `diagnostic` | [`KernelMutex`]               |
//! | ----- | ------------ | ----------------------------- |
//! | on    | on           | [`Diagnostic`]`<`[`SpinIplMutex`]`>` |
//! | on    | off          | [`SpinIplMutex`]              |
//! | off   | on           | [`Diagnostic`]`<`[`UniIplMutex`]`>`  |
//! | off   | off          | [`UniIplMutex`]               |
//!
//! Both features are enabled by default.
//!
//! # Protecting Data
//!
//! A type implementing [`CurrentCpu`] resolves the running processor, which turns any
//! [`IplMutex`] into a [`lock_api::RawMutex`] via [`RawCpuMutex`]:
//! * [`CpuMutex`] is a [`lock_api::Mutex`].
//! * [`CpuOnceCell`] and [`CpuLazy`] initialize static data once, see [`generic_once_cell`].
//!
//! ## Examples
//!
//! ```
//! use ipl_mutex::{CpuId, CpuInfo, CpuMutex, CurrentCpu, Ipl, RawCpuMutex, SoftIpl};
//!
//! struct ThreadCpu;
//!
//! thread_local! {
//!     static CPU: &'static CpuInfo = Box::leak(Box::new(CpuInfo::new(
//!         CpuId::from_index(0),
//!         SoftIpl::new(),
//!     )));
//! }
//!
//! // Safety: only one thread in this example.
//! unsafe impl CurrentCpu for ThreadCpu {
//!     type Spl = SoftIpl;
//!
//!     fn current() -> &'static CpuInfo {
//!         CPU.with(|cpu| *cpu)
//!     }
//! }
//!
//! let number: CpuMutex<ThreadCpu, usize> = CpuMutex::from_raw(RawCpuMutex::new(Ipl::BIO), 0);
//!
//! // Modify the data
//! *number.lock() = 2;
//!
//! // Read the data
//! let guard = number.lock();
//! assert_eq!(2, *guard);
//! assert_eq!(ThreadCpu::current().ipl(), Ipl::BIO);
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(unsafe_op_in_unsafe_fn)]

pub(crate) mod backoff;
pub(crate) mod cpu;
pub(crate) mod interrupts;
pub(crate) mod ipl;
pub(crate) mod lock;
pub(crate) mod mutex;
pub(crate) mod owner;

pub use backoff::{CpuRelax, SpinWait};
pub use cpu::{CpuId, CpuInfo, CpuTable};
pub use interrupts::{with_ipl, HardwareIpl};
pub use ipl::{
    set_splassert_mode, splassert, splassert_mode, AtomicIpl, InterruptLevelController, Ipl,
    IplError, SoftIpl, SplAssertMode,
};
pub use lock::{CpuLazy, CpuMutex, CpuMutexGuard, CpuOnceCell, CurrentCpu, RawCpuMutex};
pub use mutex::diagnostic::Diagnostic;
pub use mutex::spin::SpinIplMutex;
pub use mutex::uni::UniIplMutex;
pub use mutex::{IplMutex, KernelMutex};
pub use owner::{AtomicOwner, AtomicOwnerCell};
