pub mod steps;
pub mod world;
