use worktrack_sdk::framework::{bootstrap::Bootstrap, TrackerResponse};

use crate::state::bootstrap_state::BootstrapState;

use super::{
    logging_bootstrap_step::LoggingBootstrapStep,
    serve_demo_traffic_step::ServeDemoTrafficStep, start_tracker_step::StartTrackerStep,
};
/// Starts up the host using `BootstrapState`
///
/// # Steps
///
/// 1. [LoggingBootstrapStep] - Installs the logger at the configured level
/// 2. [StartTrackerStep] - Starts the zombie detector polling loop
/// 3. [ServeDemoTrafficStep] - Pushes simulated traffic through the tracker, prints the
///    outstanding view and stops the tracker
///
pub async fn boot(state: BootstrapState) -> TrackerResponse {
    let bootstrap = &Bootstrap::new(state);
    bootstrap
        .step(LoggingBootstrapStep)
        .await?
        .step(StartTrackerStep)
        .await?
        .step(ServeDemoTrafficStep)
        .await?;
    Ok(())
}
