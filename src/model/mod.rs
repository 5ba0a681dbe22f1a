pub mod prediction;
pub mod price;
pub mod report;
