pub mod emitter;
pub mod types;

pub use emitter::TapEmitter;
pub use types::{TapEvent, TapKind};
