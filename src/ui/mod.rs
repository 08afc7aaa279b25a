pub mod icons;
pub mod progress;

pub use progress::{RunUI, render_report};
