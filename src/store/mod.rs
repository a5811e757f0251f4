pub mod directory;
pub mod orders;
pub mod quotes;
