pub mod broadcast;
pub mod classifier;
pub mod environment;
pub mod subprocess;
