// deltrack-daemon library entry point (embedded in a host, or driven by deltrackd).

pub mod access;
pub mod buffer;
pub mod config;
pub mod context;
pub mod flush;
pub mod host;
pub mod reconcile;
pub mod runtime;
pub mod store;
pub mod tracker;
