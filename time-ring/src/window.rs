use crate::error::TimeWindowError;
use crate::ring::RingStore;

/// Associative sliding window of timestamp/value pairs.
///
/// Each slot covers `element_time` seconds; the slot for timestamp `ts` is
/// logical position `floor(ts / element_time)`. From tail to head the slots
/// are contiguous and monotonically increasing in time. Writing past the
/// current head advances the window, filling any intervening gap slots with
/// `None` so data gaps stay visible; writes behind the tail are rejected as
/// stale. Slots that are in range but never written read back as `None`.
#[derive(Debug, Clone)]
pub struct TimeWindow<T> {
    ring: RingStore<Option<T>>,
    element_time: f64,
}

impl<T> TimeWindow<T> {
    /// Builds a window of `size` slots ending at `head_time` (exclusive).
    pub fn new(size: usize, head_time: f64, element_time: f64) -> Result<Self, TimeWindowError> {
        if !(element_time.is_finite() && element_time > 0.0) {
            return Err(TimeWindowError::InvalidElementTime { element_time });
        }
        let head_num = (head_time / element_time).floor() as i64;
        Ok(Self {
            ring: RingStore::new(size, head_num, || None),
            element_time,
        })
    }

    pub fn size(&self) -> usize {
        self.ring.capacity()
    }

    pub fn element_time(&self) -> f64 {
        self.element_time
    }

    pub fn head_num(&self) -> i64 {
        self.ring.head()
    }

    pub fn tail_num(&self) -> i64 {
        self.ring.tail()
    }

    pub fn head_time(&self) -> f64 {
        self.timestamp(self.head_num())
    }

    pub fn tail_time(&self) -> f64 {
        self.timestamp(self.tail_num())
    }

    /// Logical slot index for a timestamp.
    pub fn index(&self, timestamp: f64) -> i64 {
        (timestamp / self.element_time).floor() as i64
    }

    /// Inverse of [`index`](Self::index).
    pub fn timestamp(&self, index: i64) -> f64 {
        index as f64 * self.element_time
    }

    /// Rounds a timestamp down to its slot boundary.
    pub fn floor_ts(&self, timestamp: f64) -> f64 {
        self.timestamp(self.index(timestamp))
    }

    /// True if the timestamp falls within `[tail_time, head_time)`.
    pub fn contains(&self, timestamp: f64) -> bool {
        let idx = self.index(timestamp);
        idx >= self.tail_num() && idx < self.head_num()
    }

    /// Stores `value` at the slot covering `timestamp`.
    ///
    /// Ahead of the head the window advances first, filling gap slots with
    /// `None`; inside the window the slot is overwritten; behind the tail the
    /// write fails with `StaleWrite` (callers treat that as arrived too late
    /// to matter).
    pub fn put(&mut self, timestamp: f64, value: T) -> Result<(), TimeWindowError> {
        let idx = self.index(timestamp);
        if idx >= self.head_num() {
            let steps = idx - self.head_num() + 1;
            self.ring.advance(steps, || None);
        } else if idx < self.tail_num() {
            return Err(TimeWindowError::StaleWrite {
                timestamp,
                tail_time: self.tail_time(),
            });
        }
        self.ring
            .set(idx, Some(value))
            .expect("slot in range after advance");
        Ok(())
    }

    /// Reads the slot covering `timestamp`. `Ok(None)` means the slot is in
    /// range but was never written (or sits in a data gap).
    pub fn get(&self, timestamp: f64) -> Result<Option<&T>, TimeWindowError> {
        let idx = self.index(timestamp);
        match self.ring.get(idx) {
            Ok(slot) => Ok(slot.as_ref()),
            Err(_) => Err(self.out_of_range(timestamp)),
        }
    }

    pub fn get_mut(&mut self, timestamp: f64) -> Result<Option<&mut T>, TimeWindowError> {
        let idx = self.index(timestamp);
        let err = self.out_of_range(timestamp);
        match self.ring.get_mut(idx) {
            Ok(slot) => Ok(slot.as_mut()),
            Err(_) => Err(err),
        }
    }

    /// Time-ordered pass over the full window extent, tail to head. Lazy and
    /// restartable: each call walks the extent as of now.
    pub fn iter(&self) -> impl Iterator<Item = (f64, Option<&T>)> {
        (self.tail_num()..self.head_num()).map(move |idx| {
            let slot = self
                .ring
                .get(idx)
                .expect("iteration stays inside the retained range");
            (self.timestamp(idx), slot.as_ref())
        })
    }

    /// Bulk range read over `[start_ts, stop_ts)` with an explicit step (in
    /// seconds, a multiple of the element time).
    pub fn range(
        &self,
        start_ts: f64,
        stop_ts: f64,
        step_ts: f64,
    ) -> Result<Vec<Option<&T>>, TimeWindowError> {
        let start = self.index(start_ts);
        let stop = self.index(stop_ts);
        let step = (step_ts / self.element_time).floor() as i64;
        match self.ring.range(start, stop, step) {
            Ok(slots) => Ok(slots.into_iter().map(|s| s.as_ref()).collect()),
            Err(crate::RingError::InvalidStep { .. }) => {
                Err(TimeWindowError::InvalidStep { step: step_ts })
            }
            Err(_) => Err(self.out_of_range(start_ts)),
        }
    }

    fn out_of_range(&self, timestamp: f64) -> TimeWindowError {
        TimeWindowError::OutOfRange {
            timestamp,
            tail_time: self.tail_time(),
            head_time: self.head_time(),
        }
    }
}
