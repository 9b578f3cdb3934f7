//! QR challenge payload encoding.
//!
//! Image rendering proper is outside the gateway; subscribers receive the
//! challenge as a self-describing data URL they can render client-side.

use base64::Engine as _;

/// Encode a raw QR challenge as a displayable data-URL payload.
///
/// Pure and stateless; the same challenge always yields the same payload.
pub fn qr_payload(challenge: &str) -> String {
    format!(
        "data:text/plain;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(challenge)
    )
}
