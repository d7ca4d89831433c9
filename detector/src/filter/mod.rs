pub mod gate;
pub mod mask;
pub mod motion;
