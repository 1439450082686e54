//! Client for the binary register protocol spoken by Danfoss Air HRV units
//! over TCP, and the command-line tooling built on top of it.

pub mod commands;
pub mod connection;
pub mod device;
pub mod output;
pub mod protocol;
pub mod registers;
