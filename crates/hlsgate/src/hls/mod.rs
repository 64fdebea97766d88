//! HLS-specific machinery: playlist rewriting, URI resolution, manifest
//! fetch, and the segment prefetch fan-out.

pub mod fetch;
pub mod prefetch;
pub mod resolve;
pub mod rewriter;

pub use fetch::{fetch_manifest, snapshot_headers};
pub use prefetch::spawn_prefetch;
pub use resolve::resolve;
pub use rewriter::{RewriteContext, RewrittenManifest, rewrite_manifest};

/// Content type for rewritten manifests.
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
