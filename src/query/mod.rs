pub mod plan;
pub mod rows;
