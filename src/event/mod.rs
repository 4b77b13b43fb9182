pub mod normalize;
pub mod value;

pub use normalize::{normalize, NormalizedEvent};
pub use value::EventValue;
