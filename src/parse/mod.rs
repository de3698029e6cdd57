mod parse;
mod resolve;

pub use parse::{load_file, parse_entries, Format, StreamEntry};
pub use resolve::{
    parse_declaration, resolve, StreamInputs, StreamSpec, DEFAULT_DESTINATION, DEFAULT_SOURCE,
    STREAMS_ENV,
};
