//! Progress reporting and cooperative cancellation.
//!
//! Long running operations take a `&mut dyn Progress` and call
//! [`Progress::report`] with a percentage of their own work. Nested steps wrap
//! the parent in a [`ProgressRange`] which maps 0..=100 into a window of the
//! parent's range. The top-level [`Reporter`] clamps values so the callback only
//! ever observes a non-decreasing percentage, and checks the interrupt flag on
//! every call.
use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub trait Progress {
    /// Reports that `percent` (0..=100) of the current operation is done.
    ///
    /// Returns [`Error::Interrupted`] when the caller asked to stop.
    fn report(&mut self, percent: u32) -> Result<()>;
}

/// Discards every report and never interrupts.
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: u32) -> Result<()> {
        Ok(())
    }
}

/// Top-level progress sink forwarding to a callback.
pub struct Reporter<F: FnMut(u32)> {
    callback: F,
    interrupt: Option<Arc<AtomicBool>>,
    last: u32,
}

impl<F: FnMut(u32)> Reporter<F> {
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            interrupt: None,
            last: 0,
        }
    }

    /// Makes every report fail with [`Error::Interrupted`] once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }
}

impl<F: FnMut(u32)> Progress for Reporter<F> {
    fn report(&mut self, percent: u32) -> Result<()> {
        if let Some(flag) = &self.interrupt {
            if flag.load(Ordering::Relaxed) {
                return Err(Error::Interrupted);
            }
        }
        let percent = percent.min(100).max(self.last);
        self.last = percent;
        (self.callback)(percent);
        Ok(())
    }
}

/// Maps the progress of a sub-operation into `start..=end` of its parent.
pub struct ProgressRange<'a> {
    parent: &'a mut dyn Progress,
    start: u32,
    end: u32,
}

impl<'a> ProgressRange<'a> {
    pub fn new(parent: &'a mut dyn Progress, start: u32, end: u32) -> Self {
        let end = end.clamp(start, 100);
        Self { parent, start, end }
    }

    /// The window of the `index`-th of `count` equally sized steps.
    pub fn step(parent: &'a mut dyn Progress, index: usize, count: usize) -> Self {
        if count == 0 {
            return Self::new(parent, 0, 100);
        }
        let start = (index * 100 / count) as u32;
        let end = ((index + 1) * 100 / count) as u32;
        Self::new(parent, start, end)
    }
}

impl Progress for ProgressRange<'_> {
    fn report(&mut self, percent: u32) -> Result<()> {
        let percent = percent.min(100);
        self.parent
            .report(self.start + (self.end - self.start) * percent / 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_is_monotonic() {
        let mut seen = Vec::new();
        {
            let mut r = Reporter::new(|p| seen.push(p));
            r.report(10).unwrap();
            r.report(5).unwrap();
            r.report(250).unwrap();
        }
        assert_eq!(seen, vec![10, 10, 100]);
    }

    #[test]
    fn test_nested_ranges() {
        let mut seen = Vec::new();
        {
            let mut r = Reporter::new(|p| seen.push(p));
            let mut outer = ProgressRange::new(&mut r, 20, 60);
            let mut inner = ProgressRange::step(&mut outer, 1, 2);
            inner.report(0).unwrap();
            inner.report(50).unwrap();
            inner.report(100).unwrap();
        }
        assert_eq!(seen, vec![40, 50, 60]);
    }

    #[test]
    fn test_interrupt_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut r = Reporter::new(|_| {}).with_interrupt(flag.clone());
        assert!(r.report(1).is_ok());
        flag.store(true, Ordering::Relaxed);
        assert!(matches!(r.report(2), Err(Error::Interrupted)));
    }
}
