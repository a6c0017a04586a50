use std::ops::Range;

use serde::Serialize;
use tracing::instrument;

use crate::utils::format_hex;

/// One decoded detection: a classified target with coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    kind: String,
    target_id: u32,
    latitude: f64,
    longitude: f64,
}

impl DetectionRecord {
    /// Creates a detection record.
    #[must_use]
    pub fn new(kind: impl Into<String>, target_id: u32, latitude: f64, longitude: f64) -> Self {
        Self {
            kind: kind.into(),
            target_id,
            latitude,
            longitude,
        }
    }

    /// Returns the detection type identifier.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the numeric target identifier.
    #[must_use]
    pub fn target_id(&self) -> u32 {
        self.target_id
    }

    /// Returns the latitude in decimal degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Returns the longitude in decimal degrees.
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Classified result of decoding one notification payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// At least one record matched; holds the last one.
    Decoded(DetectionRecord),
    /// Printable text was present but no record parsed.
    Invalid,
    /// The payload was empty, not UTF-8, or not printable.
    NoText,
}

/// Everything derived from one payload: diagnostics plus the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    hex: String,
    text: Option<String>,
    outcome: DecodeOutcome,
}

impl DecodedPayload {
    /// Space-separated uppercase hex rendering of the raw bytes.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Trimmed printable text, when the payload had any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    #[must_use]
    pub fn outcome(&self) -> &DecodeOutcome {
        &self.outcome
    }

    /// Splits the payload into its display parts and the outcome.
    #[must_use]
    pub fn into_parts(self) -> (String, Option<String>, DecodeOutcome) {
        (self.hex, self.text, self.outcome)
    }
}

/// Decodes raw notification bytes into detection records.
pub struct PayloadDecoder;

impl PayloadDecoder {
    /// Decodes one notification payload.
    ///
    /// Records follow `TYPE, ID, LAT, LON`. When the text carries several
    /// matches the last one that parses wins, since peripherals may resend a
    /// growing buffer.
    ///
    /// ```
    /// use dronelink::{DecodeOutcome, DetectionRecord, PayloadDecoder};
    ///
    /// let decoded = PayloadDecoder::decode(b"bird, 3, 45.1, -75.2 bird, 4, 45.2, -75.3");
    /// assert_eq!(
    ///     &DecodeOutcome::Decoded(DetectionRecord::new("bird", 4, 45.2, -75.3)),
    ///     decoded.outcome()
    /// );
    /// ```
    #[must_use]
    #[instrument(skip(payload), level = "trace", fields(payload_len = payload.len()))]
    pub fn decode(payload: &[u8]) -> DecodedPayload {
        let hex = format_hex(payload);
        let Some(text) = printable_text(payload) else {
            return DecodedPayload {
                hex,
                text: None,
                outcome: DecodeOutcome::NoText,
            };
        };

        let outcome = last_record(text).map_or(DecodeOutcome::Invalid, DecodeOutcome::Decoded);
        DecodedPayload {
            hex,
            text: Some(text.to_string()),
            outcome,
        }
    }
}

fn printable_text(payload: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(payload).ok()?;
    let trimmed = text.trim_matches(|c: char| c <= ' ');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().any(is_unprintable_control) {
        return None;
    }
    Some(trimmed)
}

/// C0 and C1 control characters, minus the ASCII layout controls and the
/// information separators `\x1C..=\x1F`.
fn is_unprintable_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{E}'..='\u{1B}' | '\u{7F}'..='\u{9F}')
}

fn last_record(text: &str) -> Option<DetectionRecord> {
    let bytes = text.as_bytes();
    let mut start = 0usize;
    let mut last = None;

    while start < bytes.len() {
        match match_record_at(bytes, start) {
            Some(found) => {
                if let Some(record) = found.parse(text) {
                    last = Some(record);
                }
                start = found.end;
            }
            None => start += 1,
        }
    }

    last
}

/// Byte ranges of one grammar match.
#[derive(Debug)]
struct RecordMatch {
    kind: Range<usize>,
    target_id: Range<usize>,
    latitude: Range<usize>,
    longitude: Range<usize>,
    end: usize,
}

impl RecordMatch {
    fn parse(&self, text: &str) -> Option<DetectionRecord> {
        // Ids are bounded to the signed 32-bit range peripherals encode.
        let target_id = u32::try_from(text[self.target_id.clone()].parse::<i32>().ok()?).ok()?;
        let latitude = parse_coordinate(&text[self.latitude.clone()])?;
        let longitude = parse_coordinate(&text[self.longitude.clone()])?;
        Some(DetectionRecord::new(
            &text[self.kind.clone()],
            target_id,
            latitude,
            longitude,
        ))
    }
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn match_record_at(bytes: &[u8], start: usize) -> Option<RecordMatch> {
    let mut pos = start;
    let kind = take_while(bytes, &mut pos, is_kind_byte)?;
    expect_separator(bytes, &mut pos)?;
    let target_id = take_while(bytes, &mut pos, |b| b.is_ascii_digit())?;
    expect_separator(bytes, &mut pos)?;
    let latitude = take_decimal(bytes, &mut pos)?;
    expect_separator(bytes, &mut pos)?;
    let longitude = take_decimal(bytes, &mut pos)?;

    Some(RecordMatch {
        kind,
        target_id,
        latitude,
        longitude,
        end: pos,
    })
}

fn is_kind_byte(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'-'
}

fn is_space_byte(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0B | 0x0C | b'\r')
}

fn take_while(bytes: &[u8], pos: &mut usize, accept: impl Fn(u8) -> bool) -> Option<Range<usize>> {
    let start = *pos;
    while *pos < bytes.len() && accept(bytes[*pos]) {
        *pos += 1;
    }
    (*pos > start).then_some(start..*pos)
}

fn expect_separator(bytes: &[u8], pos: &mut usize) -> Option<()> {
    let _ = take_while(bytes, pos, is_space_byte);
    if bytes.get(*pos) != Some(&b',') {
        return None;
    }
    *pos += 1;
    let _ = take_while(bytes, pos, is_space_byte);
    Some(())
}

fn take_decimal(bytes: &[u8], pos: &mut usize) -> Option<Range<usize>> {
    let start = *pos;
    if bytes.get(*pos) == Some(&b'-') {
        *pos += 1;
    }
    if take_while(bytes, pos, |b| b.is_ascii_digit()).is_none() {
        *pos = start;
        return None;
    }
    if bytes.get(*pos) == Some(&b'.') && bytes.get(*pos + 1).is_some_and(u8::is_ascii_digit) {
        *pos += 1;
        let _ = take_while(bytes, pos, |b| b.is_ascii_digit());
    }
    Some(start..*pos)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn record(kind: &str, target_id: u32, latitude: f64, longitude: f64) -> DecodeOutcome {
        DecodeOutcome::Decoded(DetectionRecord::new(kind, target_id, latitude, longitude))
    }

    #[rstest]
    #[case::single("bird, 3, 45.1, -75.2", record("bird", 3, 45.1, -75.2))]
    #[case::last_wins(
        "bird, 3, 45.1, -75.2 bird, 4, 45.2, -75.3",
        record("bird", 4, 45.2, -75.3)
    )]
    #[case::no_spaces("drone_x,12,-1,2", record("drone_x", 12, -1.0, 2.0))]
    #[case::noise_around("<< person_b , 7 , 10.5 , 20 >>", record("person_b", 7, 10.5, 20.0))]
    #[case::hyphenated_kind("kind-a, 1, 0.25, 0.5", record("kind-a", 1, 0.25, 0.5))]
    #[case::multiline("car, 1, 1, 1\ntruck, 2, 2.5, -2.5\n", record("truck", 2, 2.5, -2.5))]
    fn decode_returns_last_valid_record(#[case] text: &str, #[case] expected: DecodeOutcome) {
        let decoded = PayloadDecoder::decode(text.as_bytes());
        assert_eq!(&expected, decoded.outcome());
    }

    #[test]
    fn decode_skips_matches_with_unrepresentable_id() {
        let decoded = PayloadDecoder::decode(b"bird, 1, 1.0, 2.0 bird, 99999999999, 3.0, 4.0");
        assert_eq!(&record("bird", 1, 1.0, 2.0), decoded.outcome());
    }

    #[rstest]
    #[case::far_beyond("bird, 99999999999, 3.0, 4.0")]
    #[case::just_past_signed("bird, 2147483648, 1.0, 2.0")]
    #[case::unsigned_range("bird, 3000000000, 1.0, 2.0")]
    fn decode_reports_invalid_when_every_match_overflows(#[case] text: &str) {
        let decoded = PayloadDecoder::decode(text.as_bytes());
        assert_eq!(&DecodeOutcome::Invalid, decoded.outcome());
    }

    #[test]
    fn decode_accepts_largest_signed_id() {
        let decoded = PayloadDecoder::decode(b"bird, 2147483647, 1.0, 2.0");
        assert_eq!(&record("bird", 2_147_483_647, 1.0, 2.0), decoded.outcome());
    }

    #[rstest]
    #[case::file_separator("x\u{1C}bird, 3, 45.1, -75.2")]
    #[case::unit_separator("bird, 3, 45.1, -75.2 \u{1F}x")]
    #[case::tab_inside("bird,\t3, 45.1, -75.2")]
    fn decode_treats_separator_controls_as_printable(#[case] text: &str) {
        let decoded = PayloadDecoder::decode(text.as_bytes());
        assert_eq!(&record("bird", 3, 45.1, -75.2), decoded.outcome());
        assert_eq!(Some(text), decoded.text());
    }

    #[rstest]
    #[case("hello world")]
    #[case("bird, 3, 45.1")]
    #[case("bird; 3; 45.1; -75.2")]
    #[case("3, 4, 5, 6")]
    #[case("bird, -3, 45.1, -75.2")]
    fn decode_reports_invalid_for_printable_text_without_matches(#[case] text: &str) {
        let decoded = PayloadDecoder::decode(text.as_bytes());
        assert_eq!(&DecodeOutcome::Invalid, decoded.outcome());
        assert_eq!(Some(text.trim()), decoded.text());
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::controls(&[0x00, 0x01, 0x02])]
    #[case::only_whitespace(b"  \r\n ")]
    #[case::not_utf8(&[0xFF, 0xFE, 0x80])]
    #[case::embedded_control(b"bird\x07, 3, 45.1, -75.2")]
    #[case::next_line("bird, 3, 45.1, -75.2\u{85}".as_bytes())]
    #[case::escape("bird, 3\x1B, 45.1, -75.2".as_bytes())]
    fn decode_reports_no_text(#[case] payload: &[u8]) {
        let decoded = PayloadDecoder::decode(payload);
        assert_matches!(decoded.outcome(), DecodeOutcome::NoText);
        assert_eq!(None, decoded.text());
    }

    #[rstest]
    #[case(&[], "")]
    #[case(&[0x00], "00")]
    #[case(&[0x00, 0x1F, 0xAB], "00 1F AB")]
    fn decode_always_renders_hex(#[case] payload: &[u8], #[case] expected: &str) {
        let decoded = PayloadDecoder::decode(payload);
        assert_eq!(expected, decoded.hex());
        assert_eq!(payload.len().saturating_mul(3).saturating_sub(1), decoded.hex().len());
    }

    #[test]
    fn decode_trims_control_padding_before_printable_check() {
        let decoded = PayloadDecoder::decode(b"\0\0bird, 3, 45.1, -75.2\0");
        assert_eq!(&record("bird", 3, 45.1, -75.2), decoded.outcome());
        assert_eq!(Some("bird, 3, 45.1, -75.2"), decoded.text());
    }

    #[test]
    fn decode_keeps_fraction_free_trailing_dot_out_of_longitude() {
        let decoded = PayloadDecoder::decode(b"bird, 3, 45.1, -75.");
        assert_eq!(&record("bird", 3, 45.1, -75.0), decoded.outcome());
    }
}
