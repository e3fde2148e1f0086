//! Utility functions and helpers

/// Convert a base-unit amount to UI units
pub fn scale_amount(amount: u64, decimals: u8) -> f64 {
    amount as f64 / 10_f64.powi(decimals as i32)
}

/// Format amount with proper decimals
pub fn format_amount(amount: u64, decimals: u8) -> String {
    format!("{:.6}", scale_amount(amount, decimals))
}

/// Calculate percentage change
pub fn calculate_percentage_change(old_value: f64, new_value: f64) -> f64 {
    if old_value > 0.0 {
        ((new_value - old_value) / old_value) * 100.0
    } else {
        0.0
    }
}
