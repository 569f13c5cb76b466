pub mod command;
pub mod entry;
pub mod value;

pub use command::*;
pub use entry::*;
pub use value::*;
