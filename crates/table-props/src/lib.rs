mod ancestor;
mod codec;
mod command;
mod core;
mod ops;
mod plugin;
mod serde_value;
mod table_properties;
mod writer;

pub use crate::ancestor::*;
pub use crate::codec::*;
pub use crate::command::*;
pub use crate::core::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::serde_value::*;
pub use crate::table_properties::*;
pub use crate::writer::*;
