pub mod entity;
pub mod lookup;
pub mod source;
