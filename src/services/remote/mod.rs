pub mod client;
pub mod envelope;
pub mod pager;
pub mod token_cache;

pub use client::{ConnectionStatus, QueryParams, RemoteApiClient, RemoteApiError};
pub use pager::RecordPager;
pub use token_cache::{TokenCache, TokenScope};
