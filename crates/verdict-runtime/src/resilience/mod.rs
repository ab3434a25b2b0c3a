//! Resilience patterns for verdict-runtime.
//!
//! - Retry with exponential backoff for rate-limited backend calls
//! - Deterministic fallback synthesis when the agent loop does not converge

mod fallback;
mod retry;

pub use fallback::{
    collect_signals, synthesize_fallback, ANALYSIS_FALLBACK_REASONING, CHAT_FALLBACK_REASONING,
    FALLBACK_SCORE,
};
pub use retry::RetryPolicy;
