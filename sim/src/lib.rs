// Library exports for the simulated Lebai controller

pub mod robot_config;
pub mod robot;
pub mod server;

pub use robot::{RecordedCall, RpcFault, SimRobot};
pub use robot_config::SimConfig;
pub use server::{serve, spawn, SimHandle};
