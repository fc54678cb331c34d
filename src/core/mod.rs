pub mod common;
pub mod host_state;
pub mod matrix;
pub mod numa;
pub mod pci;
pub mod request;
pub mod scheduler;
pub mod topology;
