//! Infrastructure layer: everything that touches sockets or the filesystem.

pub mod discovery;
pub mod network;
pub mod storage;
