pub mod document;
pub mod errors;
pub mod parser;
pub mod serializer;

pub use document::{ConfigDocument, Entry, KeyValue, LineEnding, Section};
pub use errors::IniError;
pub use parser::{parse, parse_bytes, split_inline_comment};
pub use serializer::serialize;
