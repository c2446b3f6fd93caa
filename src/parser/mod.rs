pub mod driver;
pub mod model;

pub(crate) mod combinators;
pub(crate) mod lzf;
pub(crate) mod packed;
pub(crate) mod pipeline;

pub use driver::Parser;
pub use model::{Encoding, Opcode, RecordKind};
