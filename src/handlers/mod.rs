pub mod emit;
pub mod inspector;
