pub mod classify;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod errors;
pub mod fixture;
pub mod invoke;
pub mod target;
pub mod topology;
pub mod trial;
pub mod types;
