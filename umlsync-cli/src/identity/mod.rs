//! Identity mapping between copies, internal ids and vendor GUIDs

mod guid;
mod id_map;

pub use guid::*;
pub use id_map::*;
