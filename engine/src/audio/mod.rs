pub mod frame;
pub mod ring;
pub mod transport;
