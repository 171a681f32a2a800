pub mod daemon;
pub mod room;
