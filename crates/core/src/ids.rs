use crate::error::EngineError;

/// Generate an opaque 128-bit identifier rendered as 32 lowercase hex chars.
/// Ids are always minted server-side at row creation.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Validate an identifier received at the API edge.
pub fn validate_id(field: &'static str, id: &str) -> Result<(), EngineError> {
    if id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(EngineError::Validation {
            field,
            reason: "expected a 32-char lowercase hex identifier".into(),
        })
    }
}
