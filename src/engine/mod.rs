pub mod archive;
pub mod filter;
pub mod lifecycle;
pub mod scoring;
pub mod search;
