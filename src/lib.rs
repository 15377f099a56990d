pub mod common;
pub mod configs;
pub mod sources;

pub use common::errors::{ResolveError, Result};
pub use configs::Config;
pub use sources::youtube::{
    ResolveOptions, ResolveOutput, YouTubeResolver,
    filter::{FilterOptions, FormatFilter, Selection, filter},
    format::{ResolvedFormat, StreamDescriptor},
};
