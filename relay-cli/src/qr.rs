//! QR codes for the terminal.
//!
//! Two QR rows share one terminal row via Unicode half blocks, which keeps
//! modules roughly square since terminal cells are about twice as tall as
//! they are wide.

use qrcodegen::{QrCode, QrCodeEcc};

/// Light modules around the code.
const QUIET_ZONE: i32 = 2;

/// Render `data` as lines of half-block characters.
///
/// Returns `None` if `data` is too long for any QR code.
pub fn render(data: &str) -> Option<Vec<String>> {
    let code = match QrCode::encode_text(data, QrCodeEcc::Low) {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!("Cannot encode {} chars as QR: {}", data.len(), e);
            return None;
        }
    };

    // get_module is light outside the symbol, which gives the quiet zone
    let dark = |x: i32, y: i32| code.get_module(x, y);
    let start = -QUIET_ZONE;
    let end = code.size() + QUIET_ZONE;

    let mut lines = Vec::new();
    let mut y = start;
    while y < end {
        let line: String = (start..end)
            .map(|x| match (dark(x, y), y + 1 < end && dark(x, y + 1)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            })
            .collect();
        lines.push(line);
        y += 2;
    }
    Some(lines)
}
