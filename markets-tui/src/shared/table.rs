/// Markets table view state and rendering
use std::time::Instant;

use chrono::Local;
use markets_data::{ExchangeId, MarketTicker};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, HighlightSpacing, Paragraph, Row, Table, TableState, Wrap},
};

use super::{
    controller::{PanelState, PollingController},
    debounce::DebouncedText,
    favorites::FavoritesStore,
    flash::{Flash, FlashTracker, TickerField},
    format::{format_change_percent, format_compact, format_funding_rate, format_price},
    notify::{Notifier, Toast, ToastKind},
    sort_filter::{SortColumn, SortFilterConfig, apply, favorites_only},
};

/// Quote asset stripped from displayed symbols
const QUOTE_ASSET: &str = "USDT";

/// Star column followed by one column per [`SortColumn`]
const COLUMN_WIDTHS: [Constraint; 6] = [
    Constraint::Length(2),
    Constraint::Length(12),
    Constraint::Length(16),
    Constraint::Length(14),
    Constraint::Length(12),
    Constraint::Length(12),
];

const COLUMN_SPACING: u16 = 1;

const BG: Color = Color::Rgb(15, 15, 25);
const MUTED: Color = Color::Rgb(128, 128, 150);
const TEXT: Color = Color::Rgb(200, 200, 220);
const GREEN: Color = Color::Rgb(0, 255, 127);
const RED: Color = Color::Rgb(255, 69, 58);
const GOLD: Color = Color::Rgb(255, 215, 0);
const ACCENT: Color = Color::Rgb(100, 149, 237);

/// UI-side state of the markets table
#[derive(Debug, Default)]
pub struct TableView {
    pub sort: SortFilterConfig,
    pub search: DebouncedText,
    pub search_mode: bool,
    pub favorites_only: bool,
    pub flash: FlashTracker,
    table_state: TableState,
}

impl TableView {
    /// Rows in display order: search, sort, then the favourites-only filter.
    pub fn rows<'a>(
        &self,
        tickers: &'a [MarketTicker],
        favorites: &FavoritesStore,
    ) -> Vec<&'a MarketTicker> {
        let rows = apply(tickers, &self.sort);
        if self.favorites_only {
            favorites_only(rows, favorites.symbols())
        } else {
            rows
        }
    }

    pub fn selected(&self) -> Option<usize> {
        self.table_state.selected()
    }

    pub fn select_next(&mut self, len: usize) {
        let next = match self.table_state.selected() {
            _ if len == 0 => None,
            Some(index) => Some((index + 1).min(len - 1)),
            None => Some(0),
        };
        self.table_state.select(next);
    }

    pub fn select_previous(&mut self, len: usize) {
        let previous = match self.table_state.selected() {
            _ if len == 0 => None,
            Some(index) => Some(index.saturating_sub(1).min(len - 1)),
            None => Some(0),
        };
        self.table_state.select(previous);
    }

    /// Keep the selection inside `len` rows.
    pub fn clamp_selection(&mut self, len: usize) {
        match self.table_state.selected() {
            Some(_) if len == 0 => self.table_state.select(None),
            Some(index) if index >= len => self.table_state.select(Some(len - 1)),
            _ => {}
        }
    }

    pub fn selected_symbol<'a>(&self, rows: &[&'a MarketTicker]) -> Option<&'a str> {
        self.table_state
            .selected()
            .and_then(|index| rows.get(index))
            .map(|ticker| ticker.symbol.as_str())
    }

    /// Apply debounced search text once typing pauses. Returns true if the search changed.
    pub fn poll_search(&mut self, now: Instant) -> bool {
        match self.search.poll(now) {
            Some(text) => {
                self.sort.search_text = text.to_string();
                self.table_state.select(Some(0));
                true
            }
            None => false,
        }
    }

    pub fn leave_search(&mut self) {
        self.search_mode = false;
        if let Some(text) = self.search.flush() {
            self.sort.search_text = text.to_string();
            self.table_state.select(Some(0));
        }
    }

    pub fn toggle_sort(&mut self, column: SortColumn) {
        self.sort.toggle_column(column);
    }

    /// Record a freshly applied snapshot so changed cells flash.
    pub fn observe(&mut self, tickers: &[MarketTicker], now: Instant) {
        self.flash.observe_all(tickers, now);
    }

    /// Forget per-cell history, eg/ after an exchange switch.
    pub fn reset(&mut self) {
        self.flash.reset();
        self.table_state.select(None);
        *self.table_state.offset_mut() = 0;
    }
}

/// Header label with the active sort arrow.
pub fn header_title(column: SortColumn, sort: &SortFilterConfig) -> String {
    if sort.column == column {
        format!("{} {}", column.title(), sort.direction.arrow())
    } else {
        column.title().to_string()
    }
}

/// Sort column under a mouse click at `(x, y)` when it lands on the header row of a table
/// rendered in `area`.
pub fn header_column_at(area: Rect, x: u16, y: u16) -> Option<SortColumn> {
    let inner = Block::default().borders(Borders::ALL).inner(area);
    if y != inner.y {
        return None;
    }

    Layout::horizontal(COLUMN_WIDTHS)
        .flex(Flex::Start)
        .spacing(COLUMN_SPACING)
        .split(inner)
        .iter()
        .skip(1)
        .zip(SortColumn::ALL)
        .find(|(rect, _)| x >= rect.x && x < rect.x + rect.width)
        .map(|(_, column)| column)
}

/// Screen areas produced by [`layout`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PanelLayout {
    pub status: Rect,
    pub body: Rect,
    pub error: Rect,
    pub footer: Rect,
}

pub fn layout(area: Rect, show_error_line: bool) -> PanelLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(u16::from(show_error_line)),
            Constraint::Length(1),
        ])
        .split(area);

    PanelLayout {
        status: chunks[0],
        body: chunks[1],
        error: chunks[2],
        footer: chunks[3],
    }
}

fn exchange_name(exchange: ExchangeId) -> &'static str {
    exchange.descriptor().name
}

fn flash_style(base: Style, flash: Option<Flash>) -> Style {
    match flash {
        Some(Flash::Increased) => base.bg(Color::Rgb(0, 90, 45)),
        Some(Flash::Decreased) => base.bg(Color::Rgb(110, 20, 20)),
        None => base,
    }
}

fn signed_color(raw: Option<&str>) -> Color {
    match raw.and_then(|raw| raw.trim().parse::<f64>().ok()) {
        Some(value) if value > 0.0 => GREEN,
        Some(value) if value < 0.0 => RED,
        _ => MUTED,
    }
}

/// Draw the whole panel, returning the areas used so mouse clicks can be mapped back.
pub fn render_panel<N: Notifier>(
    f: &mut Frame,
    controller: &PollingController<N>,
    view: &mut TableView,
    favorites: &FavoritesStore,
    toast: Option<&Toast>,
    now: Instant,
) -> PanelLayout {
    let show_error_line = controller.error().is_some() && !controller.is_first_load_error();
    let areas = layout(f.area(), show_error_line);

    let rows = controller
        .snapshot()
        .map(|snapshot| view.rows(&snapshot.tickers, favorites))
        .unwrap_or_default();

    render_status(f, areas.status, controller, view, rows.len(), toast);
    render_body(f, areas.body, controller, view, favorites, &rows, now);

    if show_error_line {
        render_error_line(f, areas.error, controller.error().unwrap_or_default());
    }

    render_footer(f, areas.footer, controller.exchange());
    areas
}

fn render_status<N: Notifier>(
    f: &mut Frame,
    area: Rect,
    controller: &PollingController<N>,
    view: &TableView,
    row_count: usize,
    toast: Option<&Toast>,
) {
    let (state, state_color) = match controller.state() {
        _ if controller.is_refreshing() => ("REFRESHING", GOLD),
        PanelState::Idle => ("IDLE", MUTED),
        PanelState::Loading => ("LOADING", GOLD),
        PanelState::Ready => ("READY", GREEN),
        PanelState::Error => ("ERROR", RED),
    };

    let updated = controller
        .last_updated()
        .map(|time| time.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    let auto = if controller.is_auto_refresh() {
        format!("auto {}s", controller.refresh_interval().as_secs())
    } else {
        "auto off".to_string()
    };

    let mut spans = vec![
        Span::styled(
            format!(" ◆ {} ", exchange_name(controller.exchange()).to_uppercase()),
            Style::default().fg(GOLD).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" ● {state} "),
            Style::default().fg(state_color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" ⏱  {updated} "), Style::default().fg(ACCENT)),
        Span::styled(format!(" {auto} "), Style::default().fg(TEXT)),
        Span::styled(format!(" {row_count} rows "), Style::default().fg(TEXT)),
    ];

    if view.search_mode || !view.search.input().is_empty() {
        let cursor = if view.search_mode { "_" } else { "" };
        spans.push(Span::styled(
            format!(" /{}{cursor} ", view.search.input()),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ));
    }

    if view.favorites_only {
        spans.push(Span::styled(" ★ only ", Style::default().fg(GOLD)));
    }

    if let Some(toast) = toast {
        let color = match toast.kind {
            ToastKind::Success => GREEN,
            ToastKind::Info => ACCENT,
            ToastKind::Error => RED,
        };
        spans.push(Span::styled(
            format!(" {} ", toast.message),
            Style::default().fg(Color::Black).bg(color),
        ));
    }

    spans.push(Span::styled(
        concat!(
            " [R]efresh [A]uto [+/-]Interval [E]xchange [/]Search",
            " [F]av-only [Space]Fav [1-5]Sort [Q]uit ",
        ),
        Style::default().fg(MUTED),
    ));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Rgb(138, 43, 226)))
        .style(Style::default().bg(Color::Rgb(18, 18, 28)));

    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_message(f: &mut Frame, area: Rect, lines: Vec<Line<'_>>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" MARKETS ")
        .border_style(Style::default().fg(Color::White))
        .style(Style::default().bg(BG));

    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        area,
    );
}

fn render_body<N: Notifier>(
    f: &mut Frame,
    area: Rect,
    controller: &PollingController<N>,
    view: &mut TableView,
    favorites: &FavoritesStore,
    rows: &[&MarketTicker],
    now: Instant,
) {
    if controller.is_first_load_error() {
        let error = controller.error().unwrap_or_default();
        render_message(
            f,
            area,
            vec![
                Line::from(Span::styled(
                    "Failed to load markets",
                    Style::default().fg(RED).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(error.to_string(), Style::default().fg(TEXT))),
                Line::from(Span::styled("[R] retry", Style::default().fg(MUTED))),
            ],
        );
        return;
    }

    if controller.snapshot().is_none() {
        let message = match controller.state() {
            PanelState::Idle => "No data. [R] refresh",
            _ => "Loading markets…",
        };
        render_message(
            f,
            area,
            vec![Line::from(Span::styled(message, Style::default().fg(MUTED)))],
        );
        return;
    }

    if rows.is_empty() {
        render_message(
            f,
            area,
            vec![Line::from(Span::styled(
                "No data available.",
                Style::default().fg(MUTED),
            ))],
        );
        return;
    }

    view.clamp_selection(rows.len());

    let header = Row::new(
        std::iter::once(Cell::from(""))
            .chain(SortColumn::ALL.into_iter().map(|column| {
                let style = if view.sort.column == column {
                    Style::default().fg(GOLD).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
                };
                Cell::from(header_title(column, &view.sort)).style(style)
            })),
    )
    .height(1);

    let table_rows = rows.iter().map(|ticker| {
        let flash = |field| view.flash.flash(&ticker.symbol, field, now);
        let star = if favorites.is_favorite(&ticker.symbol) {
            Span::styled("★", Style::default().fg(GOLD))
        } else {
            Span::styled("☆", Style::default().fg(MUTED))
        };

        Row::new(vec![
            Cell::from(star),
            Cell::from(ticker.base_asset(QUOTE_ASSET).to_string())
                .style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Cell::from(format_price(&ticker.last_price)).style(flash_style(
                Style::default().fg(TEXT),
                flash(TickerField::LastPrice),
            )),
            Cell::from(format_compact(&ticker.quote_volume)).style(flash_style(
                Style::default().fg(TEXT),
                flash(TickerField::QuoteVolume),
            )),
            Cell::from(format_change_percent(ticker.price_change_percent.as_deref())).style(
                flash_style(
                    Style::default().fg(signed_color(ticker.price_change_percent.as_deref())),
                    flash(TickerField::PriceChangePercent),
                ),
            ),
            Cell::from(format_funding_rate(&ticker.funding_rate)).style(flash_style(
                Style::default().fg(signed_color(Some(ticker.funding_rate.as_str()))),
                flash(TickerField::FundingRate),
            )),
        ])
        .height(1)
    });

    let title = match controller.state() {
        PanelState::Loading => " MARKETS (updating) ",
        _ => " MARKETS ",
    };

    let table = Table::new(table_rows, COLUMN_WIDTHS)
        .header(header)
        .column_spacing(COLUMN_SPACING)
        .flex(Flex::Start)
        .highlight_spacing(HighlightSpacing::Never)
        .row_highlight_style(Style::default().bg(Color::Rgb(45, 45, 70)))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(Color::White))
                .style(Style::default().bg(BG)),
        );

    f.render_stateful_widget(table, area, &mut view.table_state);
}

fn render_error_line(f: &mut Frame, area: Rect, error: &str) {
    let line = Line::from(vec![
        Span::styled(format!(" ⚠ {error} "), Style::default().fg(RED)),
        Span::styled(" [R] retry  [X] dismiss ", Style::default().fg(MUTED)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_footer(f: &mut Frame, area: Rect, exchange: ExchangeId) {
    let footer = format!(
        " Data from {} Futures API. Funding rates shown for perpetual futures only.",
        exchange_name(exchange)
    );
    f.render_widget(
        Paragraph::new(Span::styled(footer, Style::default().fg(MUTED))),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{
        controller::{AdapterSet, FetchOutcome, FetchTrigger, PanelEvent},
        notify::ToastQueue,
        storage::MemoryStore,
    };
    use markets_data::{DataError, FetchError, MarketFeed, MarketSnapshot};
    use ratatui::{Terminal, backend::TestBackend};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn controller() -> PollingController<ToastQueue> {
        let (events_tx, _) = mpsc::unbounded_channel();
        PollingController::new(
            ExchangeId::BinanceFuturesUsd,
            Duration::from_secs(8),
            MarketFeed::default(),
            AdapterSet::default(),
            events_tx,
            ToastQueue::default(),
        )
    }

    fn deliver(
        controller: &mut PollingController<ToastQueue>,
        result: Result<Vec<MarketTicker>, FetchError>,
    ) {
        let result = result.map(|tickers| MarketSnapshot {
            exchange: ExchangeId::BinanceFuturesUsd,
            tickers,
            funding_error: None,
            time_received: chrono::Utc::now(),
        });
        controller.handle_event(PanelEvent::Fetched(FetchOutcome {
            exchange: ExchangeId::BinanceFuturesUsd,
            epoch: 0,
            trigger: FetchTrigger::Initial,
            result,
        }));
    }

    fn favorites() -> FavoritesStore {
        FavoritesStore::load(Box::new(MemoryStore::new()))
    }

    fn draw(controller: &PollingController<ToastQueue>, view: &mut TableView) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 20)).unwrap();
        let favorites = favorites();
        terminal
            .draw(|f| {
                render_panel(f, controller, view, &favorites, None, Instant::now());
            })
            .unwrap();

        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn ticker(symbol: &str, quote_volume: &str) -> MarketTicker {
        MarketTicker::new(symbol, "99842.1", "1", quote_volume, Some("2.5".to_string()))
    }

    #[test]
    fn test_header_title_marks_active_column() {
        let sort = SortFilterConfig::default();
        assert_eq!(header_title(SortColumn::QuoteVolume, &sort), "24h Volume ↓");
        assert_eq!(header_title(SortColumn::Symbol, &sort), "Symbol");
    }

    #[test]
    fn test_header_column_at() {
        let area = Rect::new(0, 3, 100, 20);

        // Border at x=0, star column at x=1..3, symbol column starts at x=4
        assert_eq!(header_column_at(area, 5, 4), Some(SortColumn::Symbol));
        assert_eq!(header_column_at(area, 20, 4), Some(SortColumn::LastPrice));
        assert_eq!(header_column_at(area, 5, 5), None);
        assert_eq!(header_column_at(area, 1, 4), None);
        assert_eq!(header_column_at(area, 99, 4), None);
    }

    #[test]
    fn test_selection_moves_within_rows() {
        let mut view = TableView::default();

        view.select_previous(3);
        assert_eq!(view.selected(), Some(0));
        view.select_next(3);
        view.select_next(3);
        view.select_next(3);
        assert_eq!(view.selected(), Some(2));

        view.clamp_selection(1);
        assert_eq!(view.selected(), Some(0));
        view.clamp_selection(0);
        assert_eq!(view.selected(), None);
    }

    #[test]
    fn test_rows_favorites_only() {
        let tickers = vec![ticker("BTCUSDT", "2"), ticker("ETHUSDT", "1")];
        let mut favorites = favorites();
        favorites.toggle("ETHUSDT", Instant::now());
        let mut view = TableView::default();

        assert_eq!(view.rows(&tickers, &favorites).len(), 2);

        view.favorites_only = true;
        let rows = view.rows(&tickers, &favorites);
        assert_eq!(rows.len(), 1);
        assert_eq!(view.selected_symbol(&rows), None);
        view.select_next(rows.len());
        assert_eq!(view.selected_symbol(&rows), Some("ETHUSDT"));
    }

    #[test]
    fn test_render_table() {
        let mut controller = controller();
        deliver(&mut controller, Ok(vec![ticker("BTCUSDT", "18244522331.66")]));
        let mut view = TableView::default();

        let screen = draw(&controller, &mut view);

        assert!(screen.contains("BINANCE"));
        assert!(screen.contains("READY"));
        assert!(screen.contains("99,842.10"));
        assert!(screen.contains("18.24B"));
        assert!(screen.contains("+2.50%"));
        assert!(screen.contains("24h Volume ↓"));
        assert!(screen.contains("Data from Binance Futures API."));
        assert!(!screen.contains("BTCUSDT"));
    }

    #[test]
    fn test_render_empty_snapshot() {
        let mut controller = controller();
        deliver(&mut controller, Ok(vec![]));

        let screen = draw(&controller, &mut TableView::default());

        assert!(screen.contains("No data available."));
    }

    #[test]
    fn test_render_first_load_error() {
        let mut controller = controller();
        deliver(
            &mut controller,
            Err(FetchError::Ticker {
                exchange: ExchangeId::BinanceFuturesUsd,
                source: DataError::Http("connection refused".to_string()),
            }),
        );

        let screen = draw(&controller, &mut TableView::default());

        assert!(screen.contains("Failed to load markets"));
        assert!(!screen.contains("[X] dismiss"));
    }

    #[test]
    fn test_render_dismissed_first_load_error_shows_idle_hint() {
        let mut controller = controller();
        deliver(
            &mut controller,
            Err(FetchError::Ticker {
                exchange: ExchangeId::BinanceFuturesUsd,
                source: DataError::Http("connection refused".to_string()),
            }),
        );
        controller.dismiss_error();

        let screen = draw(&controller, &mut TableView::default());

        assert_eq!(controller.state(), PanelState::Idle);
        assert!(screen.contains("No data. [R] refresh"));
        assert!(!screen.contains("Loading markets"));
    }

    #[test]
    fn test_render_later_error_keeps_table() {
        let mut controller = controller();
        deliver(&mut controller, Ok(vec![ticker("BTCUSDT", "1000")]));
        deliver(
            &mut controller,
            Err(FetchError::Ticker {
                exchange: ExchangeId::BinanceFuturesUsd,
                source: DataError::Http("timeout".to_string()),
            }),
        );

        let screen = draw(&controller, &mut TableView::default());

        assert!(screen.contains("99,842.10"));
        assert!(screen.contains("[X] dismiss"));
    }
}
