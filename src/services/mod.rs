pub mod encryption_service;
pub mod remote;
pub mod sync;
