pub mod config;
pub mod dispatch;
pub mod errors;
pub mod filters;
pub mod logging;
pub mod pipeline;
pub mod results;
pub mod search;
pub mod sync;
pub mod walker;

pub use config::{CompiledConfig, SearchConfig};
pub use errors::{SearchError, SearchResult};
pub use pipeline::{find, Pipeline, SearchStreams};
pub use results::{
    Entry, EntryKind, LineNumber, MatchLine, Reporter, SearchOutput, SearchSummary,
    BINARY_MATCH_MARKER,
};
