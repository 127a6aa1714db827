pub mod jack;
pub mod pulse;
pub mod rt;
