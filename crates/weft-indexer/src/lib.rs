//! Module analysis, discovery cache and discovery traversal

pub mod analyzer;
pub mod cache;
pub mod discoverer;
pub mod fingerprint;
pub mod languages;
pub mod parser_pool;


#[cfg(test)]
pub mod test_utils;

pub use analyzer::{AnalyzerHelper, ModuleAnalysis, ModuleAnalyzer, ModuleInput};
pub use cache::{CacheError, CacheKey, DiscoveryCache};
pub use discoverer::{discover_modules, DiscoveryError, DiscoveryRequest, DiscoveryResult};
pub use fingerprint::{fingerprint_file, FingerprintedSource};
pub use languages::TypeScriptAnalyzer;
pub use parser_pool::{create_parser_pool, Dialect, ParserPool};
