pub mod audit;
pub mod config;
pub mod digest;
pub mod engine;
pub mod local;
pub mod manifest;
pub mod paths;
pub mod remote;
pub mod util;

#[cfg(test)]
pub mod fakes;
