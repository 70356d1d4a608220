pub mod acceleration;
pub mod sbt;
