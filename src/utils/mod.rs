pub mod constants;
pub mod string_utils;

pub use constants::*;
pub use string_utils::{normalize_whitespace, safe_truncate_chars, tidy_multiline};
