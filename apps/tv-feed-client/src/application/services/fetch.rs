//! Candle Fetch Orchestration
//!
//! Two retrieval strategies over the same gateway and state machine:
//!
//! - **Sequential**: one chart session, symbols retrieved one at a time
//!   by repointing the session's series (`modify_series`) at each next
//!   symbol. Cheapest on the server, results arrive in input order by
//!   construction.
//! - **Concurrent**: one chart session per symbol, all series created up
//!   front, completions absorbed in whatever order the server finishes.
//!   Results are re-ordered to input order before returning.
//!
//! Both strategies subscribe to events before issuing any command, so a
//! completion can never slip past between send and subscribe.

use tracing::{debug, instrument, warn};

use crate::application::ports::ChartGateway;
use crate::application::services::commands::SessionCommands;
use crate::domain::candle::{Bar, CandleMachine, MachineAction, batch_size_for};
use crate::domain::session::{SessionBinding, SessionIdGenerator, SessionKind, SessionRegistry};
use crate::domain::validate::{validate_amount, validate_symbols, validate_timeframe};
use crate::error::ClientError;

// =============================================================================
// Request / Result Types
// =============================================================================

/// One multi-symbol candle retrieval request.
#[derive(Debug, Clone)]
pub struct CandleRequest {
    /// Symbols to retrieve, optionally exchange-prefixed.
    pub symbols: Vec<String>,
    /// Timeframe in wire form (validated and normalized before use).
    pub timeframe: String,
    /// Bars to retrieve per symbol; `None` fetches all available history.
    pub amount: Option<u64>,
}

impl CandleRequest {
    /// Build a request.
    #[must_use]
    pub fn new(
        symbols: impl IntoIterator<Item = impl Into<String>>,
        timeframe: impl Into<String>,
        amount: Option<u64>,
    ) -> Self {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            timeframe: timeframe.into(),
            amount,
        }
    }

    /// Validate all fields and return the normalized timeframe.
    fn validated_timeframe(&self) -> Result<String, ClientError> {
        validate_symbols(&self.symbols)?;
        validate_amount(self.amount)?;
        validate_timeframe(&self.timeframe)
    }
}

/// Finished bars for one requested symbol.
#[derive(Debug, Clone)]
pub struct SymbolCandles {
    /// The requested symbol.
    pub symbol: String,
    /// Bars in ascending timestamp order, trimmed to the requested amount.
    pub bars: Vec<Bar>,
}

// =============================================================================
// Fetcher
// =============================================================================

/// Retrieval orchestrator bound to one gateway.
pub struct CandleFetcher<'g, G: ChartGateway + ?Sized> {
    gateway: &'g G,
    generator: SessionIdGenerator,
}

impl<'g, G: ChartGateway + ?Sized> CandleFetcher<'g, G> {
    /// Bind a fetcher to a gateway.
    #[must_use]
    pub fn new(gateway: &'g G) -> Self {
        Self {
            gateway,
            generator: SessionIdGenerator::new(),
        }
    }

    /// Retrieve all symbols over a single chart session, one at a time.
    ///
    /// The session's series is created once for the first symbol and then
    /// repointed at each subsequent symbol with a fresh symbol handle.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] for bad input,
    /// [`ClientError::Data`] when the server rejects a symbol, and
    /// [`ClientError::Connection`] if the event flow ends mid-retrieval.
    #[instrument(skip_all, fields(symbols = request.symbols.len(), timeframe = %request.timeframe))]
    pub async fn fetch_sequential(
        &self,
        request: &CandleRequest,
    ) -> Result<Vec<SymbolCandles>, ClientError> {
        let timeframe = request.validated_timeframe()?;
        let batch = batch_size_for(request.amount);
        let commands = SessionCommands::new(self.gateway);

        let mut subscription = self.gateway.subscribe();

        let session = self.generator.session(SessionKind::Chart);
        let handles = self.generator.series_handles();
        commands.chart_create_session(&session).await?;

        let mut machine = CandleMachine::new();
        let mut results = Vec::with_capacity(request.symbols.len());

        for (index, symbol) in request.symbols.iter().enumerate() {
            debug!(%session, %symbol, "retrieving symbol");
            machine.begin(&session, symbol, index, request.amount);

            if index == 0 {
                commands
                    .resolve_symbol(&session, &handles.symbol_handle, symbol)
                    .await?;
                commands
                    .create_series(&session, &handles, &timeframe, batch)
                    .await?;
            } else {
                let symbol_handle = self.generator.symbol_handle();
                commands
                    .resolve_symbol(&session, &symbol_handle, symbol)
                    .await?;
                commands
                    .modify_series(&session, &handles, &timeframe, &symbol_handle)
                    .await?;
            }

            loop {
                let event = subscription.recv().await.ok_or_else(|| {
                    ClientError::Connection("event flow ended mid-retrieval".into())
                })?;
                match machine.on_event(&event) {
                    Some(MachineAction::RequestMore { session, batch }) => {
                        commands
                            .request_more_data(&session, &handles.series_group, batch)
                            .await?;
                    }
                    Some(MachineAction::Terminal { session }) => {
                        let state = machine.take(&session).ok_or_else(|| {
                            ClientError::data(symbol, "terminal state already harvested")
                        })?;
                        let series = state.into_candles()?;
                        results.push(SymbolCandles {
                            symbol: series.symbol,
                            bars: series.bars,
                        });
                        break;
                    }
                    None => {}
                }
            }
        }

        Ok(results)
    }

    /// Retrieve all symbols at once, one chart session per symbol.
    ///
    /// Completions are absorbed in server order and re-sorted to input
    /// order before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] for bad input,
    /// [`ClientError::Data`] when the server rejects any symbol, and
    /// [`ClientError::Connection`] if the event flow ends mid-retrieval.
    #[instrument(skip_all, fields(symbols = request.symbols.len(), timeframe = %request.timeframe))]
    pub async fn fetch_concurrent(
        &self,
        request: &CandleRequest,
    ) -> Result<Vec<SymbolCandles>, ClientError> {
        let timeframe = request.validated_timeframe()?;
        let batch = batch_size_for(request.amount);
        let commands = SessionCommands::new(self.gateway);

        let mut subscription = self.gateway.subscribe();

        let mut machine = CandleMachine::new();
        let mut registry = SessionRegistry::new();

        for (index, symbol) in request.symbols.iter().enumerate() {
            let session = self.generator.session(SessionKind::Chart);
            let handles = self.generator.series_handles();
            debug!(%session, %symbol, "opening session");

            commands.chart_create_session(&session).await?;
            commands
                .resolve_symbol(&session, &handles.symbol_handle, symbol)
                .await?;
            commands
                .create_series(&session, &handles, &timeframe, batch)
                .await?;

            machine.begin(&session, symbol, index, request.amount);
            registry.bind(
                &session,
                SessionBinding {
                    symbol: symbol.clone(),
                    index,
                    handles,
                },
            );
        }

        let mut slots: Vec<Option<SymbolCandles>> = Vec::new();
        slots.resize_with(request.symbols.len(), || None);
        let mut remaining = request.symbols.len();

        while remaining > 0 {
            let event = subscription
                .recv()
                .await
                .ok_or_else(|| ClientError::Connection("event flow ended mid-retrieval".into()))?;
            match machine.on_event(&event) {
                Some(MachineAction::RequestMore { session, batch }) => {
                    let group = registry
                        .lookup(&session)
                        .map(|binding| binding.handles.series_group.clone())
                        .ok_or_else(|| {
                            ClientError::Connection(format!("no binding for session {session}"))
                        })?;
                    commands.request_more_data(&session, &group, batch).await?;
                }
                Some(MachineAction::Terminal { session }) => {
                    let state = machine.take(&session).ok_or_else(|| {
                        ClientError::Connection(format!("no state for session {session}"))
                    })?;
                    registry.unbind(&session);
                    let series = state.into_candles()?;
                    slots[series.index] = Some(SymbolCandles {
                        symbol: series.symbol,
                        bars: series.bars,
                    });
                    remaining -= 1;
                }
                None => {}
            }
        }

        let mut results = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(candles) => results.push(candles),
                None => {
                    warn!(index, "slot left unfilled after retrieval");
                    return Err(ClientError::Connection(format!(
                        "retrieval finished without a result for symbol {index}"
                    )));
                }
            }
        }
        Ok(results)
    }
}
