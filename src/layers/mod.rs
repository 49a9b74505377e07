pub mod base;
pub mod coordinator;
pub mod observer;
pub mod tile;
