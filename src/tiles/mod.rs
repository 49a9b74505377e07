pub mod cache;
pub mod decode;
pub mod loader;
pub mod source;
pub mod transport;

// Re-exports for convenience
pub use cache::{CacheStats, TileCache, TileState};
pub use decode::{ImageDecoder, TileDecoder, TileImage};
pub use loader::{FetchContext, FetchHandle, FetchStatus, TileLoader};
pub use source::{OpenStreetMapSource, TemplateSource, TileSource};
pub use transport::{ReqwestTransport, TileTransport};
