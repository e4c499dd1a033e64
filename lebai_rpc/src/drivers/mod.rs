#[cfg(feature="driver")]
mod driver;
#[cfg(feature="driver")]
pub use driver::*;

mod models;
pub use models::*;

mod driver_config;
pub use driver_config::*;
