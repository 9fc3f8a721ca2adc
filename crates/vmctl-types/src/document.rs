//! The [`Document`] trait every persisted entity implements.

use serde_json::Value;

/// Common behaviour shared by every entity the Document Store Adapter
/// persists in the `documents` table.
///
/// Implementors are plain structs with `#[derive(Serialize,
/// Deserialize)]`; this trait adds the handful of cross-cutting
/// operations the rest of the system needs without caring which
/// concrete entity it is holding: the discriminant stored in the
/// `type` column, the id assigned on insert, the lock field used by
/// claim queries, and a redacted view suitable for the HTTP Intake.
pub trait Document {
    /// Discriminant stored in the `documents.type` column, e.g.
    /// `"machine"` or `"request"`.
    fn type_name() -> &'static str
    where
        Self: Sized;

    /// Primary key. `None` for an entity that has not been inserted yet.
    fn id(&self) -> Option<i64>;

    /// Sets the primary key after an insert assigns one.
    fn set_id(&mut self, id: i64);

    /// Value of the entity's lock field, if it has one. Only [`Action`]
    /// and [`DeployTicket`] participate in claim queries; other
    /// entities return `None`.
    ///
    /// [`Action`]: crate::Action
    /// [`DeployTicket`]: crate::DeployTicket
    fn lock_field(&self) -> Option<i32> {
        None
    }

    /// Renders the entity as a JSON object for the HTTP Intake.
    ///
    /// `redacted` strips fields tagged hidden (e.g. [`Machine::owner`])
    /// unless the caller is an admin; `show_hidden` overrides that for
    /// admin callers. Truncation of oversized fields (e.g. a base64
    /// screenshot body) is each entity's own responsibility.
    ///
    /// [`Machine::owner`]: crate::Machine::owner
    fn redacted_view(&self, show_hidden: bool) -> Value;
}

/// Truncates a string field to `max_len` bytes (at a char boundary),
/// appending a `"...<N more bytes>"` marker when truncated. Used by
/// entities with large text payloads (e.g. screenshot base64 bodies).
#[must_use]
pub fn truncate_field(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...<{} more bytes>", &value[..end], value.len() - end)
}
