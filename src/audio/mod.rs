pub mod classifier;
pub mod frame;
pub mod tracker;
pub mod wav;
