//! vizij-api-core: shared Value, Transform, and additive Transformer API (core, engine-agnostic)

pub mod blend;
pub mod transform;
pub mod transformer;
pub mod value;

pub use blend::blend_values;
pub use transform::Transform;
pub use transformer::{Transformer, ValueTransformer};
pub use value::{Value, ValueKind};
