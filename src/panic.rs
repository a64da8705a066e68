//! Readable text for panic payloads caught by connection tasks.

use std::any::Any;

/// Text reported for payloads that are neither `&str` nor `String`.
pub const OPAQUE_PAYLOAD: &str = "non-string panic payload";

/// Message carried by a panic payload.
///
/// ```
/// use devtools_proxy::panic::{OPAQUE_PAYLOAD, panic_text};
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(panic_text(&*payload), "boom");
/// let payload: Box<dyn std::any::Any + Send> = Box::new(5_u32);
/// assert_eq!(panic_text(&*payload), OPAQUE_PAYLOAD);
/// ```
#[must_use]
pub fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        OPAQUE_PAYLOAD
    }
}
