pub mod buffer_listener;
pub mod capture_driver;
