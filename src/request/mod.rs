//! Request ingestion pipeline: line reading, tokenizing, header parsing
//! and content negotiation.

pub mod context;
pub mod headers;
pub mod ingest;
pub mod line;
pub mod negotiation;
pub mod reader;

pub use context::RequestContext;
pub use headers::HeaderMap;
pub use ingest::RequestIngest;
pub use line::{Method, RequestLine};
pub use negotiation::{ContentTypeEncoding, TransmissionMode, TransmissionResolution};
pub use reader::{BufLineReader, LineReader, Newline, RawRequestLine};
