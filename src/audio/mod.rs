pub mod buffer;
pub mod decode;
pub mod envelope;
pub mod wav;
