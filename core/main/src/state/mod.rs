pub mod bootstrap_state;
