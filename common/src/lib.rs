pub mod config;
pub mod dataset;
pub mod plot;
pub mod util;
