use std::fmt;

/// Table a handler was registered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerSlot {
    Request,
    Message,
    Pattern,
}

impl fmt::Display for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::Message => "message",
            Self::Pattern => "pattern",
        })
    }
}

/// Dispatcher configuration errors. Raised at registration, never at dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error("a {existing} handler is already registered for `{id}`")]
    DuplicateHandler { id: String, existing: HandlerSlot },
}
