//! Candle Retrieval State Machine
//!
//! Per-symbol accumulator for paginated historical bar retrieval. Each
//! chart session owns one `SymbolState`; the `CandleMachine` routes
//! inbound events to the right state by session id and tells the caller
//! what to do next (`request_more_data` or harvest a terminal result).
//!
//! # Lifecycle
//!
//! ```text
//! Requested ──▶ Accumulating ──▶ (MoreRequested ──▶ Accumulating)* ──▶ Completed
//!                                                                  └─▶ Errored
//! ```
//!
//! # Resend handling
//!
//! When a batch boundary is crossed the server re-transmits bars that were
//! already delivered. Such updates are recognizable by a bar count above
//! the batch size; the last N bars (N = bars already accumulated) are the
//! duplicates and are dropped before the remainder is merged in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::event::{ChartEvent, method};
use crate::error::ClientError;

/// Maximum number of bars one round trip may request.
pub const MAX_BATCH_SIZE: u64 = 5000;

/// Effective batch size for a requested amount.
///
/// The batch is capped at [`MAX_BATCH_SIZE`] and never below one, so the
/// boundary arithmetic cannot divide by zero. An absent amount means
/// "fetch everything available" and paginates at the cap.
#[must_use]
pub const fn batch_size_for(amount: Option<u64>) -> u64 {
    match amount {
        Some(0) => 1,
        Some(a) if a < MAX_BATCH_SIZE => a,
        _ => MAX_BATCH_SIZE,
    }
}

// =============================================================================
// Bars
// =============================================================================

/// One bar exactly as received from the wire: a slot index plus a
/// position-ordered value list (timestamp, open, high, low, close, volume).
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    /// Server-assigned slot index within the series.
    pub index: i64,
    /// Position-ordered values; a well-formed bar carries six.
    pub values: Vec<f64>,
}

impl RawBar {
    /// Convert to a field-named [`Bar`], or `None` when values are missing.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bar(&self) -> Option<Bar> {
        if self.values.len() < 6 {
            return None;
        }
        Some(Bar {
            timestamp: self.values[0] as i64,
            open: self.values[1],
            high: self.values[2],
            low: self.values[3],
            close: self.values[4],
            volume: self.values[5],
        })
    }
}

/// One validated OHLCV bar, the public result unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    /// Bar open time as a Unix timestamp in seconds.
    pub timestamp: i64,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Traded volume.
    pub volume: f64,
}

impl Bar {
    /// Bar open time as a typed UTC datetime.
    ///
    /// `None` only for timestamps outside the representable range.
    #[must_use]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

// =============================================================================
// Per-Symbol State
// =============================================================================

/// Retrieval status of one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeriesStatus {
    /// Series commands issued, no data yet.
    #[default]
    Requested,
    /// At least one update received, more may follow.
    Accumulating,
    /// A pagination continuation is in flight.
    MoreRequested,
    /// All requested data received.
    Completed,
    /// The server reported a symbol error.
    Errored,
}

impl SeriesStatus {
    /// True once no further transitions can occur.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

/// Accumulator for one symbol's in-flight retrieval.
///
/// Bars are kept oldest-first; pagination prepends each newly fetched
/// (older) window after duplicates are trimmed.
#[derive(Debug)]
pub struct SymbolState {
    symbol: String,
    index: usize,
    amount: Option<u64>,
    batch_size: u64,
    bars: Vec<RawBar>,
    status: SeriesStatus,
    error: Option<String>,
}

impl SymbolState {
    fn new(symbol: &str, index: usize, amount: Option<u64>) -> Self {
        Self {
            symbol: symbol.to_string(),
            index,
            amount,
            batch_size: batch_size_for(amount),
            bars: Vec::new(),
            status: SeriesStatus::Requested,
            error: None,
        }
    }

    /// Symbol this state accumulates for.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Position of the symbol in the caller's request.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SeriesStatus {
        self.status
    }

    /// Number of bars accumulated so far.
    #[must_use]
    pub const fn accumulated(&self) -> usize {
        self.bars.len()
    }

    /// Merge one update's bars into the accumulator.
    ///
    /// An update larger than the batch size re-sends previously seen bars
    /// at its tail; those duplicates are dropped before the remainder is
    /// prepended as the newly fetched (older) window.
    fn absorb(&mut self, mut incoming: Vec<RawBar>) {
        if incoming.len() as u64 > self.batch_size {
            let keep = incoming.len().saturating_sub(self.bars.len());
            incoming.truncate(keep);
        }
        incoming.append(&mut self.bars);
        self.bars = incoming;
        self.status = SeriesStatus::Accumulating;
    }

    /// Whether another page should be requested instead of terminating.
    ///
    /// True when the accumulated count is positive, sits exactly on a
    /// batch boundary, and the requested amount (if any) is not yet met.
    fn wants_more(&self) -> bool {
        let count = self.bars.len() as u64;
        count > 0
            && count % self.batch_size == 0
            && self.amount.is_none_or(|requested| count < requested)
    }

    /// Consume the state into its final bar sequence.
    ///
    /// Bars are trimmed to the requested amount (keeping the most recent),
    /// mapped positionally and returned oldest-first. A server-reported
    /// symbol error or a malformed bar yields a `Data` error tagged with
    /// the symbol.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Data`] when the series errored or a bar is
    /// missing values.
    pub fn into_candles(self) -> Result<SeriesResult, ClientError> {
        if let Some(message) = self.error {
            return Err(ClientError::data(self.symbol, message));
        }

        let mut bars = self.bars;
        if let Some(amount) = self.amount {
            let amount = usize::try_from(amount).unwrap_or(usize::MAX);
            if bars.len() > amount {
                let excess = bars.len() - amount;
                bars.drain(..excess);
            }
        }

        let mut candles = Vec::with_capacity(bars.len());
        for raw in &bars {
            let bar = raw.to_bar().ok_or_else(|| {
                ClientError::data(&self.symbol, format!("bar {} has missing values", raw.index))
            })?;
            candles.push(bar);
        }

        Ok(SeriesResult {
            symbol: self.symbol,
            index: self.index,
            bars: candles,
        })
    }
}

/// Finished, ordered output of one symbol's retrieval.
#[derive(Debug, Clone)]
pub struct SeriesResult {
    /// Symbol the bars belong to.
    pub symbol: String,
    /// Position of the symbol in the caller's request.
    pub index: usize,
    /// Bars in ascending timestamp order.
    pub bars: Vec<Bar>,
}

// =============================================================================
// Machine
// =============================================================================

/// What the caller must do after feeding an event to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineAction {
    /// Issue `request_more_data` for this session.
    RequestMore {
        /// Chart session to continue.
        session: String,
        /// Batch size for the continuation.
        batch: u64,
    },
    /// The session reached a terminal state; harvest it with
    /// [`CandleMachine::take`].
    Terminal {
        /// Chart session that terminated.
        session: String,
    },
}

/// Keyed state table driving every in-flight symbol retrieval.
///
/// All mutation happens through [`CandleMachine::on_event`], fed from a
/// single event loop, so no state is ever written from two places.
#[derive(Debug, Default)]
pub struct CandleMachine {
    states: HashMap<String, SymbolState>,
}

impl CandleMachine {
    /// Create an empty machine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a retrieval for `symbol` on `session`.
    ///
    /// Re-registering a session (sequential mode advancing to the next
    /// symbol) replaces the previous state.
    pub fn begin(&mut self, session: &str, symbol: &str, index: usize, amount: Option<u64>) {
        self.states
            .insert(session.to_string(), SymbolState::new(symbol, index, amount));
    }

    /// Number of sessions currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when no sessions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Feed one inbound event through the transition function.
    ///
    /// Events for untracked sessions or unrelated methods are ignored
    /// (other traffic may share the connection).
    pub fn on_event(&mut self, event: &ChartEvent) -> Option<MachineAction> {
        let session = event.session_id()?;
        if !self.states.contains_key(session) {
            return None;
        }

        match event.name.as_str() {
            method::TIMESCALE_UPDATE => {
                let state = self.states.get_mut(session)?;
                match extract_bars(event) {
                    Some(incoming) => state.absorb(incoming),
                    // An update for a tracked session with no usable series
                    // poisons the state; the terminal harvest reports it.
                    None => {
                        state
                            .error
                            .get_or_insert_with(|| "update carried no usable series data".into());
                    }
                }
                None
            }
            method::SERIES_COMPLETED => self.on_batch_end(session, None),
            method::SYMBOL_ERROR => {
                let message = event
                    .params
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or("symbol error")
                    .to_string();
                self.on_batch_end(session, Some(message))
            }
            _ => None,
        }
    }

    /// Remove and return a terminated session's state.
    pub fn take(&mut self, session: &str) -> Option<SymbolState> {
        self.states.remove(session)
    }

    fn on_batch_end(&mut self, session: &str, error: Option<String>) -> Option<MachineAction> {
        let state = self.states.get_mut(session)?;
        if state.wants_more() {
            state.status = SeriesStatus::MoreRequested;
            return Some(MachineAction::RequestMore {
                session: session.to_string(),
                batch: state.batch_size,
            });
        }

        if let Some(message) = error {
            state.error = Some(message);
        }
        state.status = if state.error.is_some() {
            SeriesStatus::Errored
        } else {
            SeriesStatus::Completed
        };
        Some(MachineAction::Terminal {
            session: session.to_string(),
        })
    }
}

/// Pull the bar list out of a `timescale_update` payload.
///
/// The second parameter maps series group ids to series payloads; the
/// group of interest is found by its `sds_` prefix and its bars live
/// under the `s` key as `{i, v}` objects.
fn extract_bars(event: &ChartEvent) -> Option<Vec<RawBar>> {
    let payload = event.params.get(1)?.as_object()?;
    let series = payload
        .iter()
        .find(|(key, _)| key.starts_with("sds_"))
        .map(|(_, value)| value)?;
    let entries = series.get("s")?.as_array()?;

    let mut bars = Vec::with_capacity(entries.len());
    for entry in entries {
        let index = entry.get("i").and_then(Value::as_i64).unwrap_or_default();
        let values = entry
            .get("v")?
            .as_array()?
            .iter()
            .filter_map(Value::as_f64)
            .collect();
        bars.push(RawBar { index, values });
    }
    Some(bars)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn update(session: &str, bars: &[(i64, f64)]) -> ChartEvent {
        let entries: Vec<_> = bars
            .iter()
            .enumerate()
            .map(|(i, (ts, close))| {
                json!({"i": i, "v": [*ts as f64, 1.0, 2.0, 0.5, *close, 100.0]})
            })
            .collect();
        ChartEvent::new(
            method::TIMESCALE_UPDATE,
            vec![json!(session), json!({"sds_1": {"s": entries}})],
        )
    }

    fn completed(session: &str) -> ChartEvent {
        ChartEvent::new(method::SERIES_COMPLETED, vec![json!(session), json!("sds_1")])
    }

    fn symbol_error(session: &str, message: &str) -> ChartEvent {
        ChartEvent::new(
            method::SYMBOL_ERROR,
            vec![json!(session), json!("sds_sym_1"), json!(message)],
        )
    }

    #[test]
    fn batch_size_caps_at_maximum() {
        assert_eq!(batch_size_for(Some(3)), 3);
        assert_eq!(batch_size_for(Some(MAX_BATCH_SIZE)), MAX_BATCH_SIZE);
        assert_eq!(batch_size_for(Some(999_999)), MAX_BATCH_SIZE);
        assert_eq!(batch_size_for(None), MAX_BATCH_SIZE);
        assert_eq!(batch_size_for(Some(0)), 1);
    }

    #[test]
    fn zero_amount_does_not_panic_the_machine() {
        let mut machine = CandleMachine::new();
        machine.begin("cs_a", "AAPL", 0, Some(0));

        machine.on_event(&update("cs_a", &[(100, 1.0)]));
        assert!(matches!(
            machine.on_event(&completed("cs_a")),
            Some(MachineAction::Terminal { .. })
        ));
    }

    #[test]
    fn raw_bar_maps_by_position() {
        let raw = RawBar {
            index: 0,
            values: vec![1_700_000_000.0, 10.0, 12.0, 9.0, 11.0, 5_000.0],
        };
        let bar = raw.to_bar().unwrap();
        assert_eq!(bar.timestamp, 1_700_000_000);
        assert_eq!(bar.open, 10.0);
        assert_eq!(bar.high, 12.0);
        assert_eq!(bar.low, 9.0);
        assert_eq!(bar.close, 11.0);
        assert_eq!(bar.volume, 5_000.0);
        assert!(bar.datetime().is_some());
    }

    #[test]
    fn raw_bar_with_missing_values_is_rejected() {
        let raw = RawBar {
            index: 3,
            values: vec![1.0, 2.0],
        };
        assert!(raw.to_bar().is_none());
    }

    #[test]
    fn single_batch_completes_without_pagination() {
        let mut machine = CandleMachine::new();
        machine.begin("cs_a", "NASDAQ:AAPL", 0, Some(3));

        assert_eq!(machine.on_event(&update("cs_a", &[(100, 1.0), (200, 2.0), (300, 3.0)])), None);
        // 3 bars == batch of 3, but the amount is met, so this terminates.
        assert_eq!(
            machine.on_event(&completed("cs_a")),
            Some(MachineAction::Terminal {
                session: "cs_a".into()
            })
        );

        let result = machine.take("cs_a").unwrap().into_candles().unwrap();
        assert_eq!(result.symbol, "NASDAQ:AAPL");
        let timestamps: Vec<_> = result.bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
    }

    #[test]
    fn batch_boundary_below_amount_requests_more() {
        let mut machine = CandleMachine::new();
        machine.begin("cs_a", "AAPL", 0, Some(6_000));

        let page: Vec<_> = (0..5_000).map(|i| (i64::from(i), 1.0)).collect();
        machine.on_event(&update("cs_a", &page));
        assert_eq!(
            machine.on_event(&completed("cs_a")),
            Some(MachineAction::RequestMore {
                session: "cs_a".into(),
                batch: 5_000,
            })
        );
    }

    #[test]
    fn open_ended_retrieval_paginates_until_partial_batch() {
        let mut machine = CandleMachine::new();
        machine.begin("cs_a", "AAPL", 0, None);

        let page: Vec<_> = (0..5_000).map(|i| (i64::from(i), 1.0)).collect();
        machine.on_event(&update("cs_a", &page));
        assert!(matches!(
            machine.on_event(&completed("cs_a")),
            Some(MachineAction::RequestMore { .. })
        ));

        // A short page of older bars means the feed is exhausted.
        machine.on_event(&update("cs_a", &[(-10, 1.0)]));
        assert!(matches!(
            machine.on_event(&completed("cs_a")),
            Some(MachineAction::Terminal { .. })
        ));
    }

    #[test]
    fn resent_bars_are_trimmed_not_duplicated() {
        let mut machine = CandleMachine::new();
        // Amount 4 gives a batch size of 4; first page delivers 2 bars.
        machine.begin("cs_a", "AAPL", 0, Some(4));

        machine.on_event(&update("cs_a", &[(300, 3.0), (400, 4.0)]));
        // The next update crosses the batch boundary and re-sends both
        // known bars at its tail.
        machine.on_event(&update(
            "cs_a",
            &[(100, 1.0), (150, 1.5), (200, 2.0), (300, 3.0), (400, 4.0)],
        ));

        let terminal = machine.on_event(&completed("cs_a"));
        assert!(matches!(terminal, Some(MachineAction::Terminal { .. })));

        let result = machine.take("cs_a").unwrap().into_candles().unwrap();
        let timestamps: Vec<_> = result.bars.iter().map(|b| b.timestamp).collect();
        // Trimmed to the requested 4 most recent, no duplicates, ascending.
        assert_eq!(timestamps, vec![150, 200, 300, 400]);
    }

    #[test]
    fn terminal_output_is_trimmed_to_requested_amount() {
        let mut machine = CandleMachine::new();
        machine.begin("cs_a", "AAPL", 0, Some(2));

        machine.on_event(&update("cs_a", &[(100, 1.0)]));
        machine.on_event(&update("cs_a", &[(50, 0.5), (75, 0.7), (100, 1.0)]));
        machine.on_event(&completed("cs_a"));

        let result = machine.take("cs_a").unwrap().into_candles().unwrap();
        let timestamps: Vec<_> = result.bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(timestamps, vec![75, 100]);
    }

    #[test]
    fn symbol_error_with_no_bars_is_a_data_error() {
        let mut machine = CandleMachine::new();
        machine.begin("cs_a", "NYSE:BOGUS", 0, Some(10));

        assert_eq!(
            machine.on_event(&symbol_error("cs_a", "invalid symbol")),
            Some(MachineAction::Terminal {
                session: "cs_a".into()
            })
        );

        let state = machine.take("cs_a").unwrap();
        assert_eq!(state.status(), SeriesStatus::Errored);
        match state.into_candles() {
            Err(ClientError::Data { symbol, message }) => {
                assert_eq!(symbol, "NYSE:BOGUS");
                assert_eq!(message, "invalid symbol");
            }
            other => panic!("expected Data error, got {other:?}"),
        }
    }

    #[test]
    fn update_without_usable_series_errors_the_symbol() {
        let mut machine = CandleMachine::new();
        machine.begin("cs_a", "NASDAQ:AAPL", 0, Some(10));

        // Payload carries no sds_ series; the data must not vanish into a
        // clean zero-bar completion.
        let malformed = ChartEvent::new(
            method::TIMESCALE_UPDATE,
            vec![json!("cs_a"), json!({"other_key": {"s": []}})],
        );
        assert_eq!(machine.on_event(&malformed), None);
        assert_eq!(
            machine.on_event(&completed("cs_a")),
            Some(MachineAction::Terminal {
                session: "cs_a".into()
            })
        );

        let state = machine.take("cs_a").unwrap();
        assert_eq!(state.status(), SeriesStatus::Errored);
        assert!(matches!(
            state.into_candles(),
            Err(ClientError::Data { symbol, .. }) if symbol == "NASDAQ:AAPL"
        ));
    }

    #[test]
    fn events_for_unknown_sessions_are_ignored() {
        let mut machine = CandleMachine::new();
        machine.begin("cs_a", "AAPL", 0, Some(5));

        assert_eq!(machine.on_event(&completed("cs_other")), None);
        assert_eq!(machine.on_event(&update("cs_other", &[(1, 1.0)])), None);
        assert_eq!(machine.take("cs_a").unwrap().accumulated(), 0);
    }

    #[test]
    fn status_progression_is_observable() {
        let mut machine = CandleMachine::new();
        machine.begin("cs_a", "AAPL", 0, Some(2));
        {
            let state = machine.states.get("cs_a").unwrap();
            assert_eq!(state.status(), SeriesStatus::Requested);
            assert!(!state.status().is_terminal());
        }

        machine.on_event(&update("cs_a", &[(1, 1.0)]));
        assert_eq!(
            machine.states.get("cs_a").unwrap().status(),
            SeriesStatus::Accumulating
        );

        machine.on_event(&completed("cs_a"));
        let state = machine.take("cs_a").unwrap();
        assert_eq!(state.status(), SeriesStatus::Completed);
        assert!(state.status().is_terminal());
    }

    proptest! {
        /// Any number of pagination rounds, each re-sending everything
        /// accumulated so far, yields a strictly ascending, duplicate-free
        /// result of exactly `pages * batch` bars.
        #[test]
        fn pagination_with_resends_is_idempotent(batch in 1usize..30, pages in 1usize..5) {
            let total = batch * pages;
            let mut state = SymbolState::new("SYM", 0, None);
            state.batch_size = batch as u64;

            for page in 0..pages {
                // Page 0 is the newest window; each later page re-sends all
                // newer bars at its tail plus one older batch at its head.
                let window: Vec<RawBar> = (total - (page + 1) * batch..total)
                    .map(|i| RawBar {
                        index: i as i64,
                        values: vec![i as f64 * 10.0, 1.0, 2.0, 0.5, 1.5, 100.0],
                    })
                    .collect();
                state.absorb(window);
                if page + 1 < pages {
                    prop_assert!(state.wants_more());
                }
            }

            state.status = SeriesStatus::Completed;
            let result = state.into_candles().unwrap();
            let timestamps: Vec<_> = result.bars.iter().map(|b| b.timestamp).collect();
            prop_assert_eq!(timestamps.len(), total);
            prop_assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
