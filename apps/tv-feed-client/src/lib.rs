//! # tv-feed-client
//!
//! TradingView chart data client. Maintains one multiplexed WebSocket
//! connection and retrieves historical OHLCV series for any number of
//! symbols, sequentially, concurrently, or as a stream of per-symbol
//! results.
//!
//! ## Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain** (`domain/`): pure retrieval logic. Event shapes, the
//!   per-symbol candle state machine with its pagination and resend
//!   rules, session identifier minting, and input validation. No I/O.
//! - **Application** (`application/`): orchestration over the
//!   [`ChartGateway`] port. Typed command issuance and the sequential,
//!   concurrent, and streaming retrieval strategies.
//! - **Infrastructure** (`infrastructure/`): the wire. Length-prefixed
//!   frame codec, endpoint catalog with fallback, credential exchange,
//!   the WebSocket connector with its keepalive-echoing read task, the
//!   event dispatch hub, and environment configuration.
//!
//! ## Example
//!
//! ```no_run
//! use tv_feed_client::{CandleFetcher, CandleRequest, ConnectOptions, Connection};
//!
//! # async fn run() -> Result<(), tv_feed_client::ClientError> {
//! let connection = Connection::connect(ConnectOptions::default()).await?;
//! let fetcher = CandleFetcher::new(&connection);
//! let request = CandleRequest::new(["NASDAQ:AAPL", "BINANCE:BTCUSDT"], "1D", Some(300));
//! let results = fetcher.fetch_concurrent(&request).await?;
//! for series in results {
//!     println!("{}: {} bars", series.symbol, series.bars.len());
//! }
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)
)]

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::ports::ChartGateway;
pub use application::services::fetch::{CandleFetcher, CandleRequest, SymbolCandles};
pub use application::services::stream::stream_candles;
pub use domain::candle::{Bar, MAX_BATCH_SIZE};
pub use error::ClientError;
pub use infrastructure::config::FeedSettings;
pub use infrastructure::tradingview::auth::SessionCredentials;
pub use infrastructure::tradingview::connector::{ConnectOptions, Connection};
pub use infrastructure::tradingview::endpoints::{Endpoint, EndpointSelector};
