pub mod source;
pub mod stream;

pub use source::{Destination, DestinationType, FileImportType, Source, SourceType};
pub use stream::RowMessage;
