pub mod remote_sync;
