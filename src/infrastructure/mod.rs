pub mod backends;
pub mod connectors;
