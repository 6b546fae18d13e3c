use crate::utils::error::TrackerError;

pub mod bootstrap;

pub type TrackerResponse = Result<(), TrackerError>;
