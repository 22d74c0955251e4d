/// Markets Panel
///
/// Top perpetual-futures markets by volume with funding rates, polled from the selected
/// exchange's REST API. Sortable, searchable and favourite-able, with changed cells flashing.
use std::{
    error::Error,
    fs::OpenOptions,
    io,
    path::Path,
    sync::Mutex,
    time::{Duration, Instant},
};

use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use markets_data::{ExchangeId, MarketFeed};
use markets_tui::{
    Applied, FavoritesStore, PanelConfig, PanelEvent, PanelLayout, PollingController, SortColumn,
    TableView, ToastQueue, default_adapters, detect_store, header_column_at, render_panel,
};
use ratatui::{Terminal, backend::CrosstermBackend, layout::Rect};
use tokio::sync::mpsc;
use tracing::info;

type Controller = PollingController<ToastQueue>;

/// Auto-refresh interval change per `+` / `-` press, also the minimum interval
const INTERVAL_STEP: Duration = Duration::from_secs(1);

/// Install a file logger; the terminal belongs to the UI.
fn init_logging(path: &Path) -> Result<(), Box<dyn Error>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = PanelConfig::from_env();
    init_logging(&config.log_file)?;
    info!(?config, "starting markets panel");

    // Setup panic hook to restore terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut controller = PollingController::new(
        config.exchange,
        config.refresh_interval,
        MarketFeed::default(),
        default_adapters(&config.adapter),
        events_tx,
        ToastQueue::default(),
    );
    let mut favorites = FavoritesStore::load(detect_store(&config.store_path));
    let mut view = TableView::default();

    // The first auto-refresh tick performs the initial load
    if config.auto_refresh {
        controller.start_auto_refresh();
    } else {
        controller.initial_load();
    }

    let result = run_app(
        &mut terminal,
        &mut controller,
        &mut favorites,
        &mut view,
        &mut events_rx,
    );

    controller.stop_auto_refresh();
    favorites.flush();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    info!("markets panel stopped");
    result.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    controller: &mut Controller,
    favorites: &mut FavoritesStore,
    view: &mut TableView,
    events_rx: &mut mpsc::UnboundedReceiver<PanelEvent>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut areas = PanelLayout::default();

    loop {
        let now = Instant::now();

        while let Ok(event) = events_rx.try_recv() {
            if controller.handle_event(event) == Applied::Snapshot {
                if let Some(snapshot) = controller.snapshot() {
                    view.observe(&snapshot.tickers, now);
                }
            }
        }

        view.poll_search(now);
        view.flash.prune(now);
        favorites.flush_due(now);

        let toast = controller.notifier().current(now).cloned();
        terminal.draw(|f| {
            areas = render_panel(f, controller, view, favorites, toast.as_ref(), now);
        })?;

        if !event::poll(tick_rate)? {
            continue;
        }

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if handle_key(key, controller, favorites, view) == Flow::Exit {
                    return Ok(());
                }
            }
            Event::Mouse(mouse) => handle_mouse(mouse, areas.body, view),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

fn handle_key(
    key: KeyEvent,
    controller: &mut Controller,
    favorites: &mut FavoritesStore,
    view: &mut TableView,
) -> Flow {
    let now = Instant::now();

    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Flow::Exit;
    }

    if view.search_mode {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => view.leave_search(),
            KeyCode::Backspace => view.search.pop(now),
            KeyCode::Char(c) => view.search.push(c, now),
            _ => {}
        }
        return Flow::Continue;
    }

    let rows = controller
        .snapshot()
        .map(|snapshot| view.rows(&snapshot.tickers, favorites))
        .unwrap_or_default();
    let selected_symbol = view.selected_symbol(&rows).map(str::to_string);
    let row_count = rows.len();

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return Flow::Exit,
        KeyCode::Char('r') | KeyCode::Char('R') => {
            if controller.error().is_some() {
                controller.retry();
            } else {
                controller.manual_refresh();
            }
        }
        KeyCode::Char('a') => controller.toggle_auto_refresh(),
        KeyCode::Char('+') | KeyCode::Char('=') => {
            let slower = controller.refresh_interval() + INTERVAL_STEP;
            controller.set_refresh_interval(slower);
        }
        KeyCode::Char('-') => {
            let faster = controller
                .refresh_interval()
                .saturating_sub(INTERVAL_STEP)
                .max(INTERVAL_STEP);
            controller.set_refresh_interval(faster);
        }
        KeyCode::Char('e') => {
            let next = controller.exchange().next();
            switch_exchange(controller, view, next);
        }
        KeyCode::Char('E') => {
            let previous = controller.exchange().previous();
            switch_exchange(controller, view, previous);
        }
        KeyCode::Char('/') => view.search_mode = true,
        KeyCode::Char('f') => view.favorites_only = !view.favorites_only,
        KeyCode::Char(' ') => {
            if let Some(symbol) = selected_symbol {
                favorites.toggle(&symbol, now);
            }
        }
        KeyCode::Char('x') => controller.dismiss_error(),
        KeyCode::Down | KeyCode::Char('j') => view.select_next(row_count),
        KeyCode::Up | KeyCode::Char('k') => view.select_previous(row_count),
        KeyCode::Char(c) => {
            if let Some(column) = SortColumn::from_hotkey(c) {
                view.toggle_sort(column);
            }
        }
        _ => {}
    }

    Flow::Continue
}

fn switch_exchange(controller: &mut Controller, view: &mut TableView, exchange: ExchangeId) {
    if controller.switch_exchange(exchange) {
        view.reset();
    }
}

fn handle_mouse(mouse: MouseEvent, table_area: Rect, view: &mut TableView) {
    if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
        return;
    }

    if let Some(column) = header_column_at(table_area, mouse.column, mouse.row) {
        view.toggle_sort(column);
    }
}
