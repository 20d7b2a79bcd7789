pub mod battery;
pub mod events;

pub use battery::*;
pub use events::*;
