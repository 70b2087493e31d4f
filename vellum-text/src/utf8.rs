//! Lenient UTF-8 decoding for script strings.
//!
//! The sequence length comes from the number of leading one bits in the
//! lead byte. Malformed input never fails: it decodes as U+FFFD.
//!
//! | input                               | result   | bytes consumed |
//! |-------------------------------------|----------|----------------|
//! | `0xxxxxxx`                          | itself   | 1              |
//! | stray continuation `10xxxxxx`       | U+FFFD   | 1              |
//! | lead with more than 4 leading ones  | U+FFFD   | 1              |
//! | continuation byte missing its `10`  | U+FFFD   | 1              |
//! | sequence cut short by end of input  | U+FFFD   | rest of input  |

pub const REPLACEMENT: u32 = 0xFFFD;

/// Sequence length announced by a lead byte (its count of leading ones,
/// or 1 for ASCII).
pub fn sequence_len(lead: u8) -> usize {
    match lead.leading_ones() {
        0 => 1,
        n => n as usize,
    }
}

/// Iterator over `(codepoint, byte length)` pairs.
#[derive(Clone, Debug)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

pub fn decode(bytes: &[u8]) -> Decoder<'_> {
    Decoder { bytes, pos: 0 }
}

impl Iterator for Decoder<'_> {
    type Item = (u32, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.bytes[self.pos..];
        let &lead = rest.first()?;
        let len = sequence_len(lead);

        let (codepoint, consumed) = match len {
            1 if lead < 0x80 => (u32::from(lead), 1),
            2..=4 if rest.len() < len => (REPLACEMENT, rest.len()),
            2..=4 => {
                let tail = &rest[1..len];
                if tail.iter().all(|b| b & 0xC0 == 0x80) {
                    let first = u32::from(lead & (0x7F >> len));
                    let value = tail
                        .iter()
                        .fold(first, |acc, b| (acc << 6) | u32::from(b & 0x3F));
                    (value, len)
                } else {
                    (REPLACEMENT, 1)
                }
            }
            _ => (REPLACEMENT, 1),
        };

        self.pos += consumed;
        Some((codepoint, consumed))
    }
}

// ===================================================================
// Tests
// ===================================================================
