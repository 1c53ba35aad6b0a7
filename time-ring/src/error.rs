use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RingError {
    #[error("position {position} outside retained range [{tail}, {head})")]
    OutOfRange { position: i64, tail: i64, head: i64 },
    #[error("range step must be positive, got {step}")]
    InvalidStep { step: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TimeWindowError {
    #[error("timestamp {timestamp} outside window [{tail_time}, {head_time})")]
    OutOfRange {
        timestamp: f64,
        tail_time: f64,
        head_time: f64,
    },
    #[error("write at {timestamp} is behind the window tail {tail_time}")]
    StaleWrite { timestamp: f64, tail_time: f64 },
    #[error("element time must be positive and finite, got {element_time}")]
    InvalidElementTime { element_time: f64 },
    #[error("range step must be a positive multiple of the element time, got {step}s")]
    InvalidStep { step: f64 },
}
