pub mod executor;
pub mod lifecycle;
pub mod limiter;
pub mod registry;
pub mod zombie;
