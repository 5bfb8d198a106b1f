pub mod memory_cursor;
pub mod paged;
pub mod sqlite_cursor;

pub use memory_cursor::MemoryCursor;
pub use paged::{PagedSession, RowFetcher};
pub use sqlite_cursor::SqliteCursor;
