//! HTTP handlers, one module per resource.

pub mod events;
pub mod health;
pub mod keys;
pub mod metrics;
pub mod orgs;
pub mod users;

use axum::http::HeaderMap;
use commands::CommandContext;

/// Header naming the editor recorded on the events a request appends.
pub const EDITOR_HEADER: &str = "x-editor";

const DEFAULT_EDITOR: &str = "api";

/// Builds the command context of a request.
pub fn context(headers: &HeaderMap) -> CommandContext {
    let editor = headers
        .get(EDITOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_EDITOR);
    CommandContext::new(editor)
}
