pub mod amounts;
pub mod logging;
