pub mod client;
pub mod discovery;
pub mod protocol;

pub use client::{connect_or_discover, fetch_live_data};
pub use discovery::Discovery;
