pub mod config;
pub mod errors;
pub mod generator;
pub mod github;
pub mod logging;
pub mod pipeline;
pub mod store;
pub mod throttle;
pub mod ui;
pub mod util;
pub mod walker;
