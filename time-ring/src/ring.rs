use crate::error::RingError;

/// Fixed-capacity circular array addressed by logical positions.
///
/// The head is a monotonically increasing logical position that never wraps;
/// the physical slot for logical position `p` is `p mod capacity`. Only the
/// most recent `capacity` positions, `[head - capacity, head)`, are
/// retrievable. Advancing the head overwrites the oldest retained slots with
/// a caller-supplied default.
#[derive(Debug, Clone)]
pub struct RingStore<T> {
    slots: Vec<T>,
    head: i64,
}

impl<T> RingStore<T> {
    /// Builds a store of `capacity` slots, each initialized from `fill`,
    /// with the logical head starting at `head`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, head: i64, mut fill: impl FnMut() -> T) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        let slots = (0..capacity).map(|_| fill()).collect();
        Self { slots, head }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Logical position one past the newest retained slot.
    pub fn head(&self) -> i64 {
        self.head
    }

    /// Oldest retained logical position.
    pub fn tail(&self) -> i64 {
        self.head - self.slots.len() as i64
    }

    fn physical(&self, position: i64) -> usize {
        position.rem_euclid(self.slots.len() as i64) as usize
    }

    fn check_bounds(&self, position: i64) -> Result<(), RingError> {
        if position < self.tail() || position >= self.head {
            return Err(RingError::OutOfRange {
                position,
                tail: self.tail(),
                head: self.head,
            });
        }
        Ok(())
    }

    pub fn get(&self, position: i64) -> Result<&T, RingError> {
        self.check_bounds(position)?;
        Ok(&self.slots[self.physical(position)])
    }

    pub fn get_mut(&mut self, position: i64) -> Result<&mut T, RingError> {
        self.check_bounds(position)?;
        let idx = self.physical(position);
        Ok(&mut self.slots[idx])
    }

    pub fn set(&mut self, position: i64, value: T) -> Result<(), RingError> {
        self.check_bounds(position)?;
        let idx = self.physical(position);
        self.slots[idx] = value;
        Ok(())
    }

    /// Moves the head forward by `n`, overwriting the `n` oldest slots with
    /// values produced by `fill`. Advancing past the capacity rewrites every
    /// slot exactly once; the head still moves the full `n` positions.
    pub fn advance(&mut self, n: i64, mut fill: impl FnMut() -> T) {
        if n <= 0 {
            return;
        }
        let rewrites = (n as usize).min(self.slots.len());
        for k in 0..rewrites {
            let idx = self.physical(self.head + k as i64);
            self.slots[idx] = fill();
        }
        self.head += n;
    }

    /// Range read with an explicit positive step over `[start, stop)`.
    /// Every touched position must be retained.
    pub fn range(&self, start: i64, stop: i64, step: i64) -> Result<Vec<&T>, RingError> {
        if step <= 0 {
            return Err(RingError::InvalidStep { step });
        }
        if start < stop {
            self.check_bounds(start)?;
            self.check_bounds(stop - 1)?;
        }
        let mut out = Vec::new();
        let mut pos = start;
        while pos < stop {
            out.push(&self.slots[self.physical(pos)]);
            pos += step;
        }
        Ok(out)
    }

    /// Range write with an explicit positive step starting at `start`.
    /// Stops at the end of `values`; every touched position must be retained.
    pub fn set_range(
        &mut self,
        start: i64,
        step: i64,
        values: impl IntoIterator<Item = T>,
    ) -> Result<(), RingError> {
        if step <= 0 {
            return Err(RingError::InvalidStep { step });
        }
        let mut pos = start;
        for value in values {
            self.set(pos, value)?;
            pos += step;
        }
        Ok(())
    }
}
