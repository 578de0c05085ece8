pub mod cli;
pub mod directory;
pub mod filter;
pub mod metrics;
pub mod scan;
pub mod server;
pub mod tls;
