use crossbeam_utils::Backoff;

/// What a processor does between two failed attempts to take a mutex.
pub trait SpinWait {
    /// Starts waiting for one acquisition.
    fn start() -> Self;

    /// Waits a little before the owner slot is checked again.
    fn wait(&mut self);
}

/// [Exponential backoff], capped by [`crossbeam_utils`].
///
/// [Exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff
impl SpinWait for Backoff {
    #[inline]
    fn start() -> Self {
        Backoff::new()
    }

    #[inline]
    fn wait(&mut self) {
        self.spin();
    }
}

/// A single [`core::hint::spin_loop`] per check.
#[derive(Clone, Copy, Default, Debug)]
pub struct CpuRelax;

impl SpinWait for CpuRelax {
    #[inline]
    fn start() -> Self {
        CpuRelax
    }

    #[inline]
    fn wait(&mut self) {
        core::hint::spin_loop();
    }
}
