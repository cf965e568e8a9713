//! API request and response data models.
//!
//! API models are distinct from database models so the wire format can evolve independently
//! of the schema. Secrets never appear in a response model.

pub mod users;
