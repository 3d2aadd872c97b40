pub mod executor;
pub mod expiry;
pub mod retry;
