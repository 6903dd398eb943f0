pub mod microphone;
pub mod notification;
pub mod registry;
