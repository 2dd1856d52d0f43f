pub mod analyze;
pub mod configure;
pub mod etr;
pub mod progress;
