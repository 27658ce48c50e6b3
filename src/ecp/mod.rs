// Comment protocol read side — models, the read API client, and the
// read-through cache the worker resolves comments through.
//
// The API is authoritative; the cache only memoizes it. A cold cache must
// change latency, never outcomes.

pub mod cache;
pub mod client;
pub mod models;
