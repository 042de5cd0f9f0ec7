//! linechat daemon library
//!
//! Configuration and argument handling, exposed so they can be tested
//! without starting the binary.

pub mod cli;
pub mod config;
