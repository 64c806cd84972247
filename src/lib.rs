pub mod batch;
pub mod configuration;
pub mod domain;
pub mod progress;
pub mod services;
