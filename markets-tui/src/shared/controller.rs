/// Polling controller
///
/// Owns the panel's data lifecycle: initial load, manual refresh, the auto-refresh timer
/// and exchange switching. Fetches run on spawned tasks and report back over a channel;
/// the UI loop feeds every [`PanelEvent`] into [`PollingController::handle_event`], so all
/// state mutation happens on the UI loop.
use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use markets_data::{
    AdapterConfig, CachePolicy, ExchangeId, FetchError, MarketAdapter, MarketFeed,
    MarketSnapshot, adapter_for,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use super::notify::Notifier;

/// Toast shown after a successful manual refresh
pub const REFRESH_SUCCESS_MESSAGE: &str = "Markets updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    Loading,
    Ready,
    Error,
}

/// What triggered a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTrigger {
    Initial,
    Manual,
    AutoRefresh,
    ExchangeSwitch,
}

impl FetchTrigger {
    /// Manual refresh and exchange switch bypass the cache entirely; auto ticks always
    /// fetch tickers but may reuse cached funding.
    pub fn cache_policy(&self) -> CachePolicy {
        match self {
            FetchTrigger::Initial => CachePolicy::UseCached,
            FetchTrigger::AutoRefresh => CachePolicy::RefreshTickers,
            FetchTrigger::Manual | FetchTrigger::ExchangeSwitch => CachePolicy::Bypass,
        }
    }
}

/// Result of one spawned fetch, tagged with the exchange and epoch it was started under
#[derive(Debug)]
pub struct FetchOutcome {
    pub exchange: ExchangeId,
    pub epoch: u64,
    pub trigger: FetchTrigger,
    pub result: Result<MarketSnapshot, FetchError>,
}

/// Messages delivered to the UI loop
#[derive(Debug)]
pub enum PanelEvent {
    AutoRefreshTick,
    Fetched(FetchOutcome),
}

/// Effect of handling one [`PanelEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A fresh snapshot replaced the current one
    Snapshot,
    /// The fetch failed; previous data was kept
    Failed,
    /// Outcome belonged to an older exchange selection
    Stale,
    /// A fetch was started
    FetchStarted,
    /// Nothing to do
    Ignored,
}

/// Adapters by exchange
pub type AdapterSet = FnvHashMap<ExchangeId, Arc<dyn MarketAdapter>>;

/// Build the REST adapter for every supported exchange.
pub fn default_adapters(config: &AdapterConfig) -> AdapterSet {
    ExchangeId::ALL
        .into_iter()
        .map(|exchange| (exchange, adapter_for(exchange, config.clone())))
        .collect()
}

pub struct PollingController<N> {
    feed: MarketFeed,
    adapters: AdapterSet,
    events_tx: mpsc::UnboundedSender<PanelEvent>,
    notifier: N,

    exchange: ExchangeId,
    epoch: u64,
    state: PanelState,
    snapshot: Option<MarketSnapshot>,
    error: Option<String>,
    refreshing: bool,
    last_updated: Option<DateTime<Utc>>,

    auto_refresh: bool,
    refresh_interval: Duration,
    timer: Option<JoinHandle<()>>,
}

impl<N: std::fmt::Debug> std::fmt::Debug for PollingController<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingController")
            .field("exchange", &self.exchange)
            .field("epoch", &self.epoch)
            .field("state", &self.state)
            .field("error", &self.error)
            .field("refreshing", &self.refreshing)
            .field("auto_refresh", &self.auto_refresh)
            .field("refresh_interval", &self.refresh_interval)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl<N: Notifier> PollingController<N> {
    pub fn new(
        exchange: ExchangeId,
        refresh_interval: Duration,
        feed: MarketFeed,
        adapters: AdapterSet,
        events_tx: mpsc::UnboundedSender<PanelEvent>,
        notifier: N,
    ) -> Self {
        Self {
            feed,
            adapters,
            events_tx,
            notifier,
            exchange,
            epoch: 0,
            state: PanelState::Idle,
            snapshot: None,
            error: None,
            refreshing: false,
            last_updated: None,
            auto_refresh: false,
            refresh_interval,
            timer: None,
        }
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&MarketSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True while a manual refresh is in flight
    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    /// Wall-clock time of the last applied snapshot
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// An error occurred before any data was shown for the current exchange
    pub fn is_first_load_error(&self) -> bool {
        self.state == PanelState::Error && self.snapshot.is_none()
    }

    /// Non-forced fetch used on startup
    pub fn initial_load(&mut self) {
        self.spawn_fetch(FetchTrigger::Initial);
    }

    /// Clear every cached response and fetch the current exchange
    pub fn manual_refresh(&mut self) {
        info!(exchange = %self.exchange, "manual refresh");
        self.feed.clear_cache();
        self.refreshing = true;
        self.spawn_fetch(FetchTrigger::Manual);
    }

    /// Retry after an error; same as a manual refresh
    pub fn retry(&mut self) {
        self.manual_refresh();
    }

    pub fn dismiss_error(&mut self) {
        if self.error.take().is_some() && self.state == PanelState::Error {
            self.state = match self.snapshot {
                Some(_) => PanelState::Ready,
                None => PanelState::Idle,
            };
        }
    }

    /// Select another exchange: in-flight results for the old selection become stale, the
    /// cache is cleared and a forced fetch starts. Returns false if already selected.
    pub fn switch_exchange(&mut self, exchange: ExchangeId) -> bool {
        if exchange == self.exchange {
            return false;
        }

        info!(from = %self.exchange, to = %exchange, "switching exchange");
        self.exchange = exchange;
        self.epoch += 1;
        self.snapshot = None;
        self.error = None;
        self.refreshing = false;
        self.last_updated = None;
        self.feed.clear_cache();
        self.spawn_fetch(FetchTrigger::ExchangeSwitch);
        true
    }

    /// Start the auto-refresh timer, replacing any running one. The first tick fires
    /// immediately.
    pub fn start_auto_refresh(&mut self) {
        self.abort_timer();

        let events_tx = self.events_tx.clone();
        let period = self.refresh_interval;
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events_tx.send(PanelEvent::AutoRefreshTick).is_err() {
                    break;
                }
            }
        }));

        self.auto_refresh = true;
        info!(interval_ms = period.as_millis() as u64, "auto-refresh started");
    }

    pub fn stop_auto_refresh(&mut self) {
        self.abort_timer();
        if self.auto_refresh {
            info!("auto-refresh stopped");
        }
        self.auto_refresh = false;
    }

    pub fn toggle_auto_refresh(&mut self) {
        if self.auto_refresh {
            self.stop_auto_refresh();
        } else {
            self.start_auto_refresh();
        }
    }

    /// Change the auto-refresh period, restarting the timer if it is running.
    pub fn set_refresh_interval(&mut self, refresh_interval: Duration) {
        self.refresh_interval = refresh_interval;
        if self.auto_refresh {
            self.start_auto_refresh();
        }
    }

    pub fn has_timer(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    pub fn handle_event(&mut self, event: PanelEvent) -> Applied {
        match event {
            PanelEvent::AutoRefreshTick if self.auto_refresh => {
                self.spawn_fetch(FetchTrigger::AutoRefresh);
                Applied::FetchStarted
            }
            PanelEvent::AutoRefreshTick => Applied::Ignored,
            PanelEvent::Fetched(outcome) => self.apply(outcome),
        }
    }

    fn apply(&mut self, outcome: FetchOutcome) -> Applied {
        if outcome.exchange != self.exchange || outcome.epoch != self.epoch {
            debug!(
                exchange = %outcome.exchange,
                epoch = outcome.epoch,
                current_epoch = self.epoch,
                "discarding stale fetch outcome"
            );
            return Applied::Stale;
        }

        let manual = outcome.trigger == FetchTrigger::Manual;
        if manual {
            self.refreshing = false;
        }

        match outcome.result {
            Ok(snapshot) => {
                debug!(
                    exchange = %snapshot.exchange,
                    rows = snapshot.tickers.len(),
                    trigger = ?outcome.trigger,
                    "applying snapshot"
                );
                self.last_updated = Some(snapshot.time_received);
                self.snapshot = Some(snapshot);
                self.error = None;
                self.state = PanelState::Ready;
                if manual {
                    self.notifier.success(REFRESH_SUCCESS_MESSAGE);
                }
                Applied::Snapshot
            }
            Err(error) => {
                warn!(%error, trigger = ?outcome.trigger, "refresh failed");
                let message = error.to_string();
                if outcome.trigger != FetchTrigger::AutoRefresh {
                    self.notifier.error(message.clone());
                }
                self.error = Some(message);
                self.state = PanelState::Error;
                Applied::Failed
            }
        }
    }

    fn spawn_fetch(&mut self, trigger: FetchTrigger) {
        let exchange = self.exchange;
        let epoch = self.epoch;

        let Some(adapter) = self.adapters.get(&exchange).cloned() else {
            warn!(%exchange, "no adapter configured");
            self.error = Some(format!("no adapter configured for {exchange}"));
            self.state = PanelState::Error;
            self.refreshing = false;
            return;
        };

        self.state = PanelState::Loading;

        let feed = self.feed.clone();
        let generation = feed.generation();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = feed
                .refresh_from(generation, adapter.as_ref(), trigger.cache_policy())
                .await;
            let outcome = FetchOutcome {
                exchange,
                epoch,
                trigger,
                result,
            };
            if events_tx.send(PanelEvent::Fetched(outcome)).is_err() {
                debug!(%exchange, "panel closed before fetch completed");
            }
        });
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<N> Drop for PollingController<N> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
