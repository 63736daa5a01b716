//! Signal Quality Evaluation
//!
//! Derives a quality index, RSSI and a qualitative descriptor from the
//! modem's `+CSQ: <rssi>,<ber>` report.

use std::fmt;

/// Token that introduces a signal-quality report
pub const QUALITY_TOKEN: &str = "+CSQ:";

/// Offset from the start of the token to the first digit
const DIGIT_OFFSET: usize = 6;

/// Index reported by the modem when the quality is not known
pub const QUALITY_UNKNOWN: u8 = 99;

/// Highest meaningful quality index
pub const QUALITY_MAX: u8 = 31;

/// One derived signal-quality reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSample {
    /// Quality index in 0..=31
    pub quality: u8,
    /// Received signal strength in dBm
    pub rssi_dbm: i32,
    /// Five-bucket qualitative descriptor
    pub descriptor: &'static str,
}

impl SignalSample {
    /// Build a sample from an already-normalized quality index
    pub fn from_quality(quality: u8) -> Self {
        let quality = normalize(quality);
        Self {
            quality,
            rssi_dbm: rssi_dbm(quality),
            descriptor: descriptor(quality),
        }
    }

    /// Build a sample from raw `AT+CSQ` response text
    pub fn from_response(text: &str) -> Self {
        Self::from_quality(parse_quality(text))
    }
}

impl fmt::Display for SignalSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quality {} or {} dBm RSSI is {}",
            self.quality, self.rssi_dbm, self.descriptor
        )
    }
}

/// Extract the quality index from `AT+CSQ` response text.
///
/// The two characters following the token's fixed offset are read as tens and
/// ones. A single-digit report (`+CSQ: 5,0`) reads as that digit. Missing
/// tokens, `99` and out-of-range values all yield 0.
pub fn parse_quality(text: &str) -> u8 {
    let Some(start) = text.find(QUALITY_TOKEN) else {
        return 0;
    };
    let digits = &text.as_bytes()[start..];

    let tens = match digits.get(DIGIT_OFFSET) {
        Some(c) if c.is_ascii_digit() => c - b'0',
        _ => return 0,
    };
    let raw = match digits.get(DIGIT_OFFSET + 1) {
        Some(c) if c.is_ascii_digit() => tens * 10 + (c - b'0'),
        _ => tens,
    };

    normalize(raw)
}

fn normalize(raw: u8) -> u8 {
    if raw > QUALITY_MAX {
        // 99 is "not known or not detectable"; anything else above 31 is junk
        0
    } else {
        raw
    }
}

/// Convert a quality index to RSSI in dBm
pub fn rssi_dbm(quality: u8) -> i32 {
    match quality {
        0 => -115,
        1 => -111,
        q => -110 + 2 * (i32::from(q) - 2),
    }
}

/// Map a quality index to its descriptor
pub fn descriptor(quality: u8) -> &'static str {
    if quality >= 18 {
        "Great"
    } else if quality >= 13 {
        "Good"
    } else if quality >= 8 {
        "Average"
    } else if quality >= 3 {
        "Below Average"
    } else {
        "Poor"
    }
}
