pub mod error;
pub mod logger;
pub mod sync;
pub mod time_utils;
