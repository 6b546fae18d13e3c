pub mod demo_host;
