//! Data models for the coin playlist.
//!
//! Three shapes of the same item: the wire form fetched from the network, the stored
//! form persisted in the offline cache, and the domain form handed to consumers.

mod coin;
mod playlist;

pub use coin::*;
pub use playlist::*;
