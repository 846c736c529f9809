//! Entity model for partitioned UML class models
//!
//! Packages own classes and enumerations; classes own attributes and are
//! linked by associations and generalizations. Every entity carries the id of
//! the schema partition it lives in.

mod entities;
mod kind;
pub mod tags;

pub use entities::*;
pub use kind::*;
