pub mod boot;
pub mod logging_bootstrap_step;
pub mod serve_demo_traffic_step;
pub mod start_tracker_step;
