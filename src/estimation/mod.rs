//! Token-savings estimation.

mod savings;

pub use savings::{SavingsBreakdown, SavingsReport, compute_savings, estimate_value_tokens};
