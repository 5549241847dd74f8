pub mod aggregate;
pub mod page_client;
pub mod payload;

pub use aggregate::AggregateClient;
pub use page_client::ReqwestPageClient;
pub use payload::{HttpPayloadFetcher, YtDlpFetcher};
