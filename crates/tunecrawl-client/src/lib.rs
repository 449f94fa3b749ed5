pub mod fetcher;
pub mod parser;

pub use fetcher::ReqwestFetcher;
pub use parser::StructuredDataParser;
