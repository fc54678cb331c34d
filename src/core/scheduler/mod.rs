pub mod composer;
pub mod constraints;
pub mod costs;
pub mod interface;
pub mod plugin;
pub mod solver_scheduler;
pub mod solvers;
