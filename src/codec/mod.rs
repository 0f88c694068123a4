pub mod wire;
pub mod verify;
pub mod encoder;
pub mod decoder;

pub use decoder::decode;
pub use encoder::encode;
pub use verify::verify_value;
