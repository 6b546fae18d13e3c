pub mod log_signal;
pub mod outstanding_view;
