pub mod cli;
pub mod config;
pub mod defaults;
pub mod falcon;
pub mod http;
pub mod logging;
pub mod push;
pub mod run;
pub mod utils;
