pub mod downloads;
pub mod favorites;
pub mod media;
pub mod parse;
pub mod settings;

use crate::error::ResolveError;

/// Boundary error string: the failure kind, then the message.
pub(crate) fn to_message(e: ResolveError) -> String {
    format!("{}: {}", e.kind(), e)
}
