pub mod messaging;
pub mod triage;
