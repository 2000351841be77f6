#[macro_use]
extern crate log;

pub mod apis;
pub mod config;
pub mod webhook;
