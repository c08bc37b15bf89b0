// Logs module - Append-mode capture of child output

mod writer;

pub use writer::{format_entry, strftime_pattern, validate_pattern, LogFiles, LogSink, Stream};
