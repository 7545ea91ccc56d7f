pub mod job;
pub mod model;
pub mod recipe;
