pub mod counter;
pub mod files;
pub mod progress;
