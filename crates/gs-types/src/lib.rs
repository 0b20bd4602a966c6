pub mod cell;
pub mod errors;
pub mod float_repr;
pub mod value;

pub use cell::*;
pub use errors::*;
pub use value::*;
