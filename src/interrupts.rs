use core::sync::atomic::Ordering;

use crate::ipl::{AtomicIpl, InterruptLevelController, Ipl};

/// Run a closure at a raised interrupt priority level.
///
/// Raises the level of `spl` to at least `ipl`, runs the closure and restores the previous level
/// afterwards.
///
/// # Examples
///
/// ```
/// use ipl_mutex::{with_ipl, InterruptLevelController, Ipl, SoftIpl};
///
/// let spl = SoftIpl::new();
/// with_ipl(&spl, Ipl::NET, || {
///     assert_eq!(spl.current(), Ipl::NET);
///     with_ipl(&spl, Ipl::BIO, || {
///         // raising to a lower level does not lower it
///         assert_eq!(spl.current(), Ipl::NET);
///     });
/// });
/// assert_eq!(spl.current(), Ipl::NONE);
/// ```
#[inline]
pub fn with_ipl<L, F, R>(spl: &L, ipl: Ipl, f: F) -> R
where
    L: InterruptLevelController + ?Sized,
    F: FnOnce() -> R,
{
    let old = spl.raise(ipl);

    let ret = f();

    spl.restore(old);

    ret
}

/// An interrupt priority level backed by the processor's interrupt mask.
///
/// The level itself is kept in software. Interrupts are masked on the executing processor while
/// the level is above [`Ipl::NONE`] and the previous interrupt state is restored when the level
/// drops back to [`Ipl::NONE`].
///
/// Only touches the hardware if `target_os = "none"`.
#[derive(Debug)]
pub struct HardwareIpl {
    level: AtomicIpl,
    interrupt_flags: AtomicFlags,
}

impl HardwareIpl {
    #[inline]
    pub const fn new() -> Self {
        Self {
            level: AtomicIpl::new(Ipl::NONE),
            interrupt_flags: AtomicFlags::new(DISABLE),
        }
    }
}

impl Default for HardwareIpl {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareIpl {
    /// Masks interrupts when the level leaves [`Ipl::NONE`].
    #[inline]
    fn mask(&self, old: Ipl, new: Ipl) {
        if old == Ipl::NONE && new != Ipl::NONE {
            let interrupt_flags = read_disable();
            self.interrupt_flags.store(interrupt_flags, Ordering::Relaxed);
        }
    }

    /// Restores the saved interrupt state when the level returns to [`Ipl::NONE`].
    #[inline]
    fn unmask(&self, old: Ipl, new: Ipl) {
        if old != Ipl::NONE && new == Ipl::NONE {
            let interrupt_flags = self.interrupt_flags.swap(DISABLE, Ordering::Relaxed);
            restore(interrupt_flags);
        }
    }
}

impl InterruptLevelController for HardwareIpl {
    #[inline]
    fn current(&self) -> Ipl {
        self.level.load(Ordering::Relaxed)
    }

    #[inline]
    fn raise(&self, ipl: Ipl) -> Ipl {
        let old = self.current();
        if ipl > old {
            self.mask(old, ipl);
            self.level.store(ipl, Ordering::Relaxed);
        }
        old
    }

    #[inline]
    fn restore(&self, ipl: Ipl) {
        let old = self.current();
        // `splx` may also move the level up.
        self.mask(old, ipl);
        self.level.store(ipl, Ordering::Relaxed);
        self.unmask(old, ipl);
    }
}

#[cfg(test)]
std::thread_local! {
    /// The number of times interrupts were masked on this thread, minus the number of restores.
    static MASKED: core::cell::Cell<isize> = const { core::cell::Cell::new(0) };
}

#[inline]
fn read_disable() -> imp::Flags {
    #[cfg(test)]
    MASKED.with(|masked| masked.set(masked.get() + 1));

    if cfg!(target_os = "none") {
        let flags = imp::get();

        if flags != DISABLE {
            imp::set(DISABLE);
        }

        flags
    } else {
        DISABLE
    }
}

#[inline]
fn restore(flags: imp::Flags) {
    #[cfg(test)]
    MASKED.with(|masked| masked.set(masked.get() - 1));

    if flags != DISABLE && cfg!(target_os = "none") {
        imp::set(flags);
    }
}

use imp::{AtomicFlags, DISABLE};

#[cfg(target_arch = "x86_64")]
mod imp {
    use x86_64::instructions::interrupts;

    pub type Flags = bool;
    pub type AtomicFlags = core::sync::atomic::AtomicBool;

    pub const DISABLE: bool = false;

    pub use interrupts::are_enabled as get;

    #[inline]
    pub fn set(enable: bool) {
        if enable {
            interrupts::enable();
        } else {
            interrupts::disable();
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod imp {
    use aarch64_cpu::registers::DAIF;
    use tock_registers::interfaces::{Readable, Writeable};

    pub type Flags = u64;
    pub type AtomicFlags = core::sync::atomic::AtomicU64;

    /// Set the `A`, `I`, and `F` bit for _masking_ interrupts.
    pub const DISABLE: u64 = 0b111000000;

    #[inline]
    pub fn get() -> u64 {
        // Only the mask bits
        DAIF.get() & DISABLE
    }

    #[inline]
    pub fn set(value: u64) {
        let value = (DAIF.get() & !DISABLE) | value;
        DAIF.set(value);
    }
}

#[cfg(target_arch = "riscv64")]
mod imp {
    use riscv::register::sstatus;

    pub type Flags = bool;
    pub type AtomicFlags = core::sync::atomic::AtomicBool;

    pub const DISABLE: bool = false;

    #[inline]
    pub fn get() -> bool {
        sstatus::read().sie()
    }

    #[inline]
    pub fn set(value: bool) {
        unsafe {
            if value {
                sstatus::set_sie();
            } else {
                sstatus::clear_sie();
            }
        }
    }
}

// Hosted targets without a known interrupt mask only track the level.
#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "riscv64"
)))]
mod imp {
    pub type Flags = bool;
    pub type AtomicFlags = core::sync::atomic::AtomicBool;

    pub const DISABLE: bool = false;

    #[inline]
    pub fn get() -> bool {
        DISABLE
    }

    #[inline]
    pub fn set(_value: bool) {}
}
