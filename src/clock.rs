//! A monotone cycle counter shared by a hierarchy and all of its cache levels.

use std::cell::Cell;

/// Process-wide, hierarchy-scoped cycle counter. Starts at 0; only the owning
/// `CacheHierarchy` advances it. Cache levels hold a read-only handle via
/// [`ClockHandle`] and never mutate it.
#[derive(Debug, Default)]
pub struct Clock {
    current_cycle: Cell<u64>,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            current_cycle: Cell::new(0),
        }
    }

    pub fn current_cycle(&self) -> u64 {
        self.current_cycle.get()
    }

    /// Advances the clock by one tick. Only called by the owning hierarchy, once per
    /// completed top-level access.
    pub fn tick(&self) {
        self.current_cycle.set(self.current_cycle.get() + 1);
    }
}

/// A read-only handle to a [`Clock`], held by every cache level. A hierarchy
/// drives its levels one probe at a time on a single thread, so a reference
/// counted handle is enough; no atomics or locking are needed.
pub type ClockHandle = std::rc::Rc<Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero_and_ticks_monotonically() {
        let clock = Clock::new();
        assert_eq!(clock.current_cycle(), 0);
        clock.tick();
        clock.tick();
        assert_eq!(clock.current_cycle(), 2);
    }
}
