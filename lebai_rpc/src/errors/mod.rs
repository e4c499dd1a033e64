mod lebai_error;
pub use lebai_error::*;
