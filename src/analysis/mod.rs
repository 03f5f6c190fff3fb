//! Per-day signal analysis: windowed correlation and the boundary-aware
//! moving average built on top of it.
//!
//! Both stages look one day back and one day ahead, so both take a
//! [`DayWindow`] rather than a bare day.
//!
//! Submodules:
//! - `correlation`: envelope/low-frequency correlation per station day.
//! - `smoothing`: the CCMA and the station-wide population accumulator.

pub mod correlation;
pub mod smoothing;

/// A day together with its immediate neighbours, any of which may be
/// missing at the edges of a timeline.
#[derive(Debug, Clone, Copy)]
pub struct DayWindow<'a, T> {
    pub previous: Option<&'a T>,
    pub current: &'a T,
    pub next: Option<&'a T>,
}

impl<'a, T> DayWindow<'a, T> {
    pub fn new(previous: Option<&'a T>, current: &'a T, next: Option<&'a T>) -> Self {
        Self {
            previous,
            current,
            next,
        }
    }

    /// The window centred on `days[index]`. Neighbours outside the slice are
    /// `None`. Panics if `index` is out of bounds.
    pub fn around(days: &'a [T], index: usize) -> Self {
        Self {
            previous: index.checked_sub(1).and_then(|i| days.get(i)),
            current: &days[index],
            next: days.get(index + 1),
        }
    }

    /// `[previous, current, next]` in time order.
    pub fn days(&self) -> [Option<&'a T>; 3] {
        [self.previous, Some(self.current), self.next]
    }
}
