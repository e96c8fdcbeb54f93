pub mod magnetometer;
pub mod models;
pub mod settings;
