//! Program images: one 16-character `0`/`1` line per word, in program order.

use std::fmt;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ImageError {
    /// Line is not 16 digits long
    BadLength { line: usize, len: usize },
    BadCharacter { line: usize, ch: char },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::BadLength { line, len } => {
                write!(f, "Line {line}: expected 16 binary digits, found {len}")
            }
            ImageError::BadCharacter { line, ch } => {
                write!(f, "Line {line}: `{ch}` is not a binary digit")
            }
        }
    }
}

impl std::error::Error for ImageError {}

pub fn to_text(words: &[u16]) -> String {
    let mut out = String::with_capacity(words.len() * 17);
    for word in words {
        out.push_str(&format!("{word:016b}\n"));
    }
    out
}

/// Read an image back. Blank lines and surrounding whitespace are ignored.
pub fn from_text(text: &str) -> Result<Vec<u16>, ImageError> {
    let mut words = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(ch) = line.chars().find(|ch| !matches!(ch, '0' | '1')) {
            return Err(ImageError::BadCharacter { line: line_no, ch });
        }
        if line.len() != 16 {
            return Err(ImageError::BadLength {
                line: line_no,
                len: line.len(),
            });
        }
        let word = line
            .bytes()
            .fold(0u16, |word, bit| word << 1 | (bit - b'0') as u16);
        words.push(word);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_lines() {
        assert_eq!(
            to_text(&[0xC010, 0x0001]),
            "1100000000010000\n0000000000000001\n"
        );
        assert_eq!(to_text(&[]), "");
    }

    #[test]
    fn reads_lines() {
        let text = "1100000000010000\r\n\n   0100001111111111  \n";
        assert_eq!(from_text(text), Ok(vec![0xC010, 0x43FF]));
        assert_eq!(from_text(&to_text(&[0xFFFF, 0])), Ok(vec![0xFFFF, 0]));
    }

    #[test]
    fn rejects_bad_lines() {
        assert_eq!(
            from_text("0000000000000000\n000\n"),
            Err(ImageError::BadLength { line: 2, len: 3 })
        );
        assert_eq!(
            from_text("\n\n00000000000000002"),
            Err(ImageError::BadCharacter { line: 3, ch: '2' })
        );
        assert_eq!(
            from_text("00000000000000000"),
            Err(ImageError::BadLength { line: 1, len: 17 })
        );
    }
}
