use worktrack_sdk::{
    async_trait::async_trait,
    framework::{bootstrap::Bootstep, TrackerResponse},
};

use crate::state::bootstrap_state::BootstrapState;

pub struct StartTrackerStep;

#[async_trait]
impl Bootstep<BootstrapState> for StartTrackerStep {
    fn get_name(&self) -> String {
        "StartTrackerStep".into()
    }

    async fn setup(&self, state: BootstrapState) -> TrackerResponse {
        state.tracker.start()
    }
}
