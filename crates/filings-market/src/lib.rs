pub mod client;
pub mod error;
pub mod mock;
pub mod service;

pub use client::FtClient;
pub use error::MarketDataError;
pub use service::MarketDataService;
