pub mod candidate;
pub mod order;
pub mod provider;
pub mod quote;
pub mod review;
