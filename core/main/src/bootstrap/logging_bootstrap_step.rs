use crate::{state::bootstrap_state::BootstrapState, VERSION};
use worktrack_sdk::{
    async_trait::async_trait,
    framework::{bootstrap::Bootstep, TrackerResponse},
    log,
    utils::{error::TrackerError, logger::init_logger},
};

pub struct LoggingBootstrapStep;

#[async_trait]
impl Bootstep<BootstrapState> for LoggingBootstrapStep {
    fn get_name(&self) -> String {
        "LoggingBootstrapStep".into()
    }

    async fn setup(&self, state: BootstrapState) -> TrackerResponse {
        let level = state.config.level_filter();
        // enter/exit lines only when tracing
        let lifecycle_level = if level == log::LevelFilter::Trace {
            log::LevelFilter::Trace
        } else {
            level.min(log::LevelFilter::Info)
        };

        if let Err(e) = init_logger(
            "worktrack".into(),
            level,
            Some(vec![(
                "worktrack_sdk::runtime::lifecycle".to_string(),
                lifecycle_level,
            )]),
        ) {
            println!("{:?} logger init error", e);
            return Err(TrackerError::BootstrapError);
        }
        log::info!("worktrack version {}", VERSION);

        Ok(())
    }
}
