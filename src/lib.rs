//! protodyn: a dynamic Protocol Buffers runtime.
//!
//! Schemas are read from `.proto` text (or the equivalent JSON tree),
//! materialized into a reflection tree, resolved, and built into runtime
//! message types that encode and decode the standard Protocol Buffers wire
//! format. No code generation is involved: messages are built and inspected
//! through field names at runtime.
//!
//! # Quick Start
//!
//! ```rust
//! use protodyn::ProtoValue;
//!
//! let mut builder = protodyn::load_proto(r#"
//!     message Point { required int32 x = 1; required int32 y = 2; }
//!     message Path { repeated Point points = 1; }
//! "#).unwrap();
//! let path_type = builder.message_type("Path").unwrap();
//!
//! let path = path_type.from_fields([(
//!     "points",
//!     ProtoValue::List(vec![
//!         ProtoValue::from_fields([("x", 1.into()), ("y", 2.into())]),
//!         ProtoValue::from_fields([("x", 3.into()), ("y", 4.into())]),
//!     ]),
//! )]).unwrap();
//!
//! let bytes = path.encode().unwrap();
//! let decoded = path_type.decode(&bytes).unwrap();
//! assert_eq!(decoded, path);
//! let points = decoded.get("points").unwrap().as_list().unwrap();
//! assert_eq!(points[1].get("y"), Some(&ProtoValue::Int32(4)));
//! ```

pub mod error;
pub mod types;
pub mod value;
pub mod parser;
pub mod reflect;
pub mod builder;
pub mod runtime;
pub mod codec;

#[cfg(feature = "serde")]
pub mod serde;

use std::path::Path;

pub use builder::{Builder, BuilderOptions};
pub use error::{ProtoError, Result};
pub use parser::ProtoDef;
pub use reflect::Schema;
pub use runtime::{Built, FieldDescriptor, Message, MessageType, MethodDescriptor, ServiceType};
pub use value::ProtoValue;

/// Parse `.proto` text into a fresh builder.
pub fn load_proto(text: &str) -> Result<Builder> {
    let mut builder = Builder::new();
    builder.import_proto(text, None)?;
    Ok(builder)
}

/// Load a schema in the JSON interchange format into a fresh builder.
#[cfg(feature = "serde")]
pub fn load_json(text: &str) -> Result<Builder> {
    let mut builder = Builder::new();
    builder.import_json(text, None)?;
    Ok(builder)
}

/// Load a schema file, and the files it imports, into a fresh builder.
pub fn load_proto_file(path: impl AsRef<Path>) -> Result<Builder> {
    let mut builder = Builder::new();
    builder.import_file(path)?;
    Ok(builder)
}
