use rp_core::{CursorSession, PagingError, Query, RemoteCursor};

/// Open a session, mapping failures to [`PagingError::SessionOpen`]
pub(crate) fn open_session(
    cursor: &dyn RemoteCursor,
    query: &Query,
    fetch_size: usize,
) -> Result<Box<dyn CursorSession>, PagingError> {
    let session = cursor.open(query, fetch_size).map_err(PagingError::SessionOpen)?;
    tracing::debug!(
        cursor = cursor.cursor_name(),
        session = %session.id(),
        fetch_size,
        total_rows = session.total_rows(),
        "session ready"
    );
    Ok(session)
}

/// Close a session if one is present
pub(crate) fn close_session(slot: &mut Option<Box<dyn CursorSession>>) {
    if let Some(mut session) = slot.take() {
        session.close();
    }
}
