/// Markets TUI - Shared Library
///
/// Everything the `markets-panel` binary needs apart from terminal setup:
/// - Polling controller driving fetches through `markets-data`
/// - Favourites persisted to a durable key-value store
/// - Search, sort and favourites filtering
/// - Flash-on-change tracking, number formatting and table rendering
pub mod shared;

pub use shared::config::PanelConfig;
pub use shared::controller::{
    AdapterSet, Applied, FetchTrigger, PanelEvent, PanelState, PollingController,
    default_adapters,
};
pub use shared::favorites::FavoritesStore;
pub use shared::notify::{Notifier, Toast, ToastKind, ToastQueue};
pub use shared::sort_filter::{SortColumn, SortDirection, SortFilterConfig};
pub use shared::storage::{JsonFileStore, KeyValueStore, MemoryStore, detect_store};
pub use shared::table::{PanelLayout, TableView, header_column_at, render_panel};
