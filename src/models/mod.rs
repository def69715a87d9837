pub mod answer;
pub mod catalog;
pub mod entity;
pub mod intent;

pub use answer::*;
pub use catalog::*;
pub use entity::*;
pub use intent::*;
