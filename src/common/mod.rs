// Shared constants and small helpers
pub mod constants;
pub mod utils;
