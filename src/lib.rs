pub mod config;
pub mod core;
pub mod printer;
pub mod scenario;
pub mod test_util;
