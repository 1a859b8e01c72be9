pub mod common;
pub mod integrate;

pub use integrate::{run_integrate, IntegrateArgs};
