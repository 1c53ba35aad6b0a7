use thiserror::Error;
use time_ring::TimeWindowError;

#[derive(Debug, Error)]
pub enum BinningError {
    #[error("invalid spans: window {window_span}s, bin {bin_span}s")]
    InvalidSpan { window_span: f64, bin_span: f64 },
    #[error("sample rate must be positive and finite, got {sample_rate}")]
    InvalidSampleRate { sample_rate: f64 },
    #[error(
        "bin span {bin_span}s at {sample_rate} Hz yields non-integral samples per bin ({got})"
    )]
    NonIntegralSpan {
        bin_span: f64,
        sample_rate: f64,
        got: f64,
    },
    #[error(transparent)]
    Window(#[from] TimeWindowError),
}
