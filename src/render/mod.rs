pub mod canvas;
pub mod frame;
pub mod palette;
pub mod text;
pub mod worker;
