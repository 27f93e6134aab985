//! Named groupings of resources with a derived embedding.
//!
//! A collection's embedding is the normalised mean of its members'
//! embeddings. It is recomputed whenever membership changes, when a member
//! resource is deleted, and when a member finishes ingestion and gains its
//! embedding (see [`register_handlers`]).

mod handlers;
mod service;


pub use handlers::register_handlers;
pub use service::{Collection, CollectionError, CollectionService, CreateCollection};
