pub mod device;
pub mod geo;
