//! Standard 14 font metrics and WinAnsi text encoding
//!
//! Only the two fonts the stamp can use are covered. Widths are in
//! thousandths of an em, taken from the Adobe core AFM files.

use serde::{Deserialize, Serialize};

/// Helvetica widths for WinAnsi codes 32..=126
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

/// Helvetica widths for WinAnsi codes 160..=255 (Latin-1 supplement)
const HELVETICA_LATIN1: [u16; 96] = [
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 160-175
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 176-191
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 192-207
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 208-223
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278, // 224-239
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500, // 240-255
];

/// Characters WinAnsi places in 0x80..=0x9F, with their Helvetica widths
const WIN_ANSI_EXTRAS: [(char, u8, u16); 9] = [
    ('€', 0x80, 556),
    ('…', 0x85, 1000),
    ('‘', 0x91, 222),
    ('’', 0x92, 222),
    ('“', 0x93, 333),
    ('”', 0x94, 333),
    ('•', 0x95, 350),
    ('–', 0x96, 556),
    ('—', 0x97, 1000),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandardFont {
    #[default]
    Helvetica,
    Courier,
}

impl StandardFont {
    /// `/BaseFont` name
    pub fn base_font(&self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::Courier => "Courier",
        }
    }

    /// Advance width of a WinAnsi code in 1/1000 em
    pub fn glyph_width(&self, code: u8) -> u16 {
        match self {
            Self::Courier => 600,
            Self::Helvetica => match code {
                32..=126 => HELVETICA_ASCII[usize::from(code - 32)],
                160..=255 => HELVETICA_LATIN1[usize::from(code - 160)],
                _ => WIN_ANSI_EXTRAS
                    .iter()
                    .find(|(_, extra, _)| *extra == code)
                    .map(|(_, _, width)| *width)
                    .unwrap_or(556),
            },
        }
    }

    /// Width of WinAnsi-encoded text at `size` points
    pub fn text_width(&self, encoded: &[u8], size: f64) -> f64 {
        let units: u32 = encoded
            .iter()
            .map(|&code| u32::from(self.glyph_width(code)))
            .sum();
        f64::from(units) * size / 1000.0
    }
}

/// Encode text as WinAnsi, replacing unmappable characters with `?`
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            _ => WIN_ANSI_EXTRAS
                .iter()
                .find(|(extra, _, _)| *extra == c)
                .map(|(_, code, _)| *code)
                .unwrap_or(b'?'),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helvetica_widths() {
        let font = StandardFont::Helvetica;
        assert_eq!(font.glyph_width(b' '), 278);
        assert_eq!(font.glyph_width(b'A'), 667);
        assert_eq!(font.glyph_width(b'W'), 944);
        assert_eq!(font.glyph_width(b'i'), 222);
        assert_eq!(font.glyph_width(b'~'), 584);
        assert_eq!(font.glyph_width(0xE9), 556); // é
    }

    #[test]
    fn test_courier_is_monospaced() {
        let font = StandardFont::Courier;
        assert_eq!(font.text_width(b"iiii", 10.0), font.text_width(b"WWWW", 10.0));
        assert_eq!(font.text_width(b"abc", 10.0), 18.0);
    }

    #[test]
    fn test_text_width_scales_with_size() {
        let font = StandardFont::Helvetica;
        let at_8 = font.text_width(b"Firmado por", 8.0);
        let at_16 = font.text_width(b"Firmado por", 16.0);
        assert!((at_16 - 2.0 * at_8).abs() < 1e-9);
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("Peña"), vec![b'P', b'e', 0xF1, b'a']);
        assert_eq!(encode_win_ansi("€—"), vec![0x80, 0x97]);
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
    }
}
