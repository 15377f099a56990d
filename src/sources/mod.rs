pub mod youtube;

pub use youtube::{ResolveOptions, ResolveOutput, YouTubeResolver};
