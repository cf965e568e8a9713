//! Database record models matching table schemas.
//!
//! Models derive `sqlx::FromRow` for query results and are kept distinct from the API models
//! so storage and wire representations can evolve independently.

pub mod users;
