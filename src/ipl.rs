use core::fmt;
use core::sync::atomic::{compiler_fence, AtomicU8, Ordering};

/// An interrupt priority level.
///
/// While a processor runs at some level, interrupt sources at or below that level cannot preempt
/// it. [`Ipl::NONE`] masks nothing and, as a mutex level, means "do not touch the level".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
#[repr(transparent)]
pub struct Ipl(u8);

impl Ipl {
    pub const NONE: Self = Self(0);
    pub const SOFTCLOCK: Self = Self(1);
    pub const SOFTNET: Self = Self(2);
    pub const SOFTTTY: Self = Self(3);
    pub const BIO: Self = Self(4);
    pub const NET: Self = Self(5);
    pub const TTY: Self = Self(6);
    pub const VM: Self = Self(7);
    pub const AUDIO: Self = Self(8);
    pub const CLOCK: Self = Self(9);
    pub const SCHED: Self = Self(10);
    pub const HIGH: Self = Self(11);

    const NAMES: [&'static str; 12] = [
        "none",
        "softclock",
        "softnet",
        "softtty",
        "bio",
        "net",
        "tty",
        "vm",
        "audio",
        "clock",
        "sched",
        "high",
    ];

    /// Validates a raw level.
    ///
    /// # Examples
    ///
    /// ```
    /// use ipl_mutex::Ipl;
    ///
    /// assert_eq!(Ipl::new(5), Ok(Ipl::NET));
    /// assert!(Ipl::new(200).is_err());
    /// ```
    #[inline]
    pub const fn new(raw: u8) -> Result<Self, IplError> {
        if raw <= Self::HIGH.0 {
            Ok(Self(raw))
        } else {
            Err(IplError { raw })
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn name(self) -> &'static str {
        Self::NAMES[self.0 as usize]
    }
}

impl fmt::Display for Ipl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Ipl {
    type Error = IplError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<Ipl> for u8 {
    fn from(ipl: Ipl) -> u8 {
        ipl.0
    }
}

/// The error returned when a raw value is not a valid [`Ipl`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IplError {
    raw: u8,
}

impl IplError {
    /// The rejected raw value.
    pub fn raw(&self) -> u8 {
        self.raw
    }
}

impl fmt::Display for IplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid interrupt priority level {} (maximum is {})",
            self.raw,
            Ipl::HIGH.0
        )
    }
}

impl core::error::Error for IplError {}

/// An [`Ipl`] which can be shared between contexts.
#[derive(Default, Debug)]
#[repr(transparent)]
pub struct AtomicIpl(AtomicU8);

impl AtomicIpl {
    #[inline]
    pub const fn new(ipl: Ipl) -> Self {
        Self(AtomicU8::new(ipl.0))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> Ipl {
        // Only valid levels are ever stored.
        Ipl(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, ipl: Ipl, order: Ordering) {
        self.0.store(ipl.0, order);
    }

    #[inline]
    pub fn swap(&self, ipl: Ipl, order: Ordering) -> Ipl {
        Ipl(self.0.swap(ipl.0, order))
    }
}

/// The interrupt priority level of one processor.
///
/// A controller is only ever driven by the processor it belongs to.
pub trait InterruptLevelController {
    /// Returns the level currently in effect.
    fn current(&self) -> Ipl;

    /// Raises the level to at least `ipl` and returns the previous level.
    ///
    /// Never lowers the level.
    fn raise(&self, ipl: Ipl) -> Ipl;

    /// Sets the level to exactly `ipl`, usually a value returned by [`raise`](Self::raise).
    fn restore(&self, ipl: Ipl);
}

/// A purely software-maintained interrupt priority level.
///
/// Suitable for hosted targets and for kernels that defer interrupts in software.
#[derive(Debug, Default)]
pub struct SoftIpl {
    level: AtomicIpl,
}

impl SoftIpl {
    #[inline]
    pub const fn new() -> Self {
        Self::with_level(Ipl::NONE)
    }

    #[inline]
    pub const fn with_level(ipl: Ipl) -> Self {
        Self {
            level: AtomicIpl::new(ipl),
        }
    }
}

impl InterruptLevelController for SoftIpl {
    #[inline]
    fn current(&self) -> Ipl {
        self.level.load(Ordering::Relaxed)
    }

    #[inline]
    fn raise(&self, ipl: Ipl) -> Ipl {
        let old = self.current();
        if ipl > old {
            self.level.store(ipl, Ordering::Relaxed);
        }
        compiler_fence(Ordering::SeqCst);
        old
    }

    #[inline]
    fn restore(&self, ipl: Ipl) {
        compiler_fence(Ordering::SeqCst);
        self.level.store(ipl, Ordering::Relaxed);
    }
}

/// What [`splassert`] does when the level is too low.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum SplAssertMode {
    /// Ignore.
    Off = 0,
    /// Log an error and continue.
    Log = 1,
    /// Panic.
    Panic = 2,
}

static SPLASSERT_MODE: AtomicU8 = AtomicU8::new(SplAssertMode::Log as u8);

/// Sets the global [`SplAssertMode`].
pub fn set_splassert_mode(mode: SplAssertMode) {
    SPLASSERT_MODE.store(mode as u8, Ordering::Relaxed);
}

/// Returns the global [`SplAssertMode`].
pub fn splassert_mode() -> SplAssertMode {
    match SPLASSERT_MODE.load(Ordering::Relaxed) {
        0 => SplAssertMode::Off,
        1 => SplAssertMode::Log,
        _ => SplAssertMode::Panic,
    }
}

/// Checks that the processor runs at `want` or above.
///
/// Returns whether the check held. A failing check is reported according to
/// [`splassert_mode`].
#[track_caller]
pub fn splassert<L: InterruptLevelController + ?Sized>(spl: &L, want: Ipl) -> bool {
    let have = spl.current();
    if have >= want {
        return true;
    }

    match splassert_mode() {
        SplAssertMode::Off => {}
        SplAssertMode::Log => {
            log::error!(
                "splassert: want {want} have {have} at {}",
                core::panic::Location::caller()
            );
        }
        SplAssertMode::Panic => panic!("splassert: want {want} have {have}"),
    }

    false
}
