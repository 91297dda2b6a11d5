//! Streaming Candle Delivery
//!
//! Concurrent retrieval that hands each symbol's bars to the caller the
//! moment its series completes, instead of waiting for the whole batch.
//! Results arrive in server completion order; each item is tagged with
//! its symbol so callers never need positional bookkeeping.
//!
//! Delivery is push-based: completed results go straight into a channel
//! and the returned stream yields them as the caller polls, with no
//! internal polling interval.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::application::ports::ChartGateway;
use crate::application::services::commands::SessionCommands;
use crate::application::services::fetch::{CandleRequest, SymbolCandles};
use crate::domain::candle::{CandleMachine, MachineAction, batch_size_for};
use crate::domain::session::{SessionBinding, SessionIdGenerator, SessionKind, SessionRegistry};
use crate::domain::validate::{validate_amount, validate_symbols, validate_timeframe};
use crate::error::ClientError;

/// Channel depth between the retrieval task and the consuming stream.
const STREAM_BUFFER: usize = 32;

/// Start a concurrent retrieval and stream per-symbol results as they
/// complete.
///
/// Validation happens before anything is spawned, so malformed input
/// fails fast instead of surfacing as the stream's first item. A failed
/// symbol ends the stream with one `Err` item after all results queued
/// before it.
///
/// # Errors
///
/// Returns [`ClientError::Validation`] for bad input.
pub fn stream_candles<G>(
    gateway: Arc<G>,
    request: CandleRequest,
) -> Result<ReceiverStream<Result<SymbolCandles, ClientError>>, ClientError>
where
    G: ChartGateway + 'static,
{
    validate_symbols(&request.symbols)?;
    validate_amount(request.amount)?;
    let timeframe = validate_timeframe(&request.timeframe)?;

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        if let Err(err) = run_retrieval(gateway.as_ref(), &request, &timeframe, &tx).await {
            error!(%err, "streaming retrieval ended with error");
            // A closed receiver just means the caller stopped listening.
            let _ = tx.send(Err(err)).await;
        }
    });

    Ok(ReceiverStream::new(rx))
}

/// Drive the concurrent retrieval, pushing each completed symbol into
/// the channel. The first failure aborts the remaining retrievals.
async fn run_retrieval<G: ChartGateway + ?Sized>(
    gateway: &G,
    request: &CandleRequest,
    timeframe: &str,
    tx: &mpsc::Sender<Result<SymbolCandles, ClientError>>,
) -> Result<(), ClientError> {
    let batch = batch_size_for(request.amount);
    let commands = SessionCommands::new(gateway);
    let generator = SessionIdGenerator::new();

    let mut subscription = gateway.subscribe();

    let mut machine = CandleMachine::new();
    let mut registry = SessionRegistry::new();

    for (index, symbol) in request.symbols.iter().enumerate() {
        let session = generator.session(SessionKind::Chart);
        let handles = generator.series_handles();

        commands.chart_create_session(&session).await?;
        commands
            .resolve_symbol(&session, &handles.symbol_handle, symbol)
            .await?;
        commands
            .create_series(&session, &handles, timeframe, batch)
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
                debug!(symbol = %series.symbol, bars = series.bars.len(), "symbol completed");
                remaining -= 1;
                if tx
                    .send(Ok(SymbolCandles {
                        symbol: series.symbol,
                        bars: series.bars,
                    }))
                    .await
                    .is_err()
                {
                    // Caller dropped the stream; stop retrieving.
                    return Ok(());
                }
            }
            None => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::infrastructure::dispatch::{DispatchHub, EventSubscription};

    struct InertGateway {
        hub: Arc<DispatchHub>,
    }

    #[async_trait::async_trait]
    impl ChartGateway for InertGateway {
        async fn send(&self, _method: &str, _params: Vec<Value>) -> Result<(), ClientError> {
            Ok(())
        }

        fn subscribe(&self) -> EventSubscription {
            Arc::clone(&self.hub).subscribe()
        }
    }

    #[tokio::test]
    async fn validation_fails_before_spawning() {
        let gateway = Arc::new(InertGateway {
            hub: Arc::new(DispatchHub::new()),
        });
        let request = CandleRequest::new(["AAPL"], "1Q", Some(10));
        assert!(matches!(
            stream_candles(gateway, request),
            Err(ClientError::Validation(_))
        ));
    }
}
