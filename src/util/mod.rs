//! Utility types shared by every layer:
//! - [`PlainOldDataType`] - element kinds
//! - [`DataType`] - POD + extent
//! - [`Dimensions`] - array sample shape
//! - [`Error`] / [`Result`] - error handling

mod pod;
mod data_type;
mod error;
mod dimensions;

pub use pod::*;
pub use data_type::*;
pub use error::*;
pub use dimensions::*;
