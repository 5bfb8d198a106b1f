//! Core contracts for paged and windowed row access
//!
//! This crate provides the abstractions shared by the page controller and
//! the window cache: the remote cursor contract, the row sink, the viewport
//! capability, and the consumer-thread helpers (dispatcher, notifier,
//! debouncer).

pub mod data;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod settings;
pub mod viewport;

// Re-export commonly used types
pub use data::{
    Batch, CellValue, CursorSession, FillMode, Query, QueryParam, RemoteCursor, RowRange,
    RowSink, SessionId, SharedSink, SortKey,
};
pub use debounce::ResizeDebouncer;
pub use dispatch::ConsumerDispatcher;
pub use error::{CursorError, PagingError, SettingsError};
pub use notify::{
    error_sink_fn, listener_fn, ChangeListener, ChangeNotifier, DataChange, ErrorSink,
};
pub use settings::{PagingContext, PagingSettings, RowsPerPage};
pub use viewport::{ViewState, Viewport};
