pub mod network;
pub mod spatial;
pub mod task;
