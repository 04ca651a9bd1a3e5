pub mod admin;
pub mod board;
pub mod file;
pub mod menu;
pub mod popup;
pub mod post;

use crate::middleware::auth::AuthContext;
use crate::services::board::BoardScope;
use serde::{Deserialize, Deserializer};

/// Boards a visitor on a public route may read from.
pub(crate) fn visitor_scope(auth: Option<&AuthContext>) -> BoardScope {
    BoardScope::public(auth.is_some_and(AuthContext::is_authenticated))
}

/// For PATCH-like bodies: a missing key is `None`, an explicit `null` is `Some(None)`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
