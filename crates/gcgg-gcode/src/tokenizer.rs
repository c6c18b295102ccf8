//! Line tokenizer, generalized from `klipper-host/src/gcode.rs`'s
//! `parse_gcode` (split on `;`, whitespace tokenization, char-then-rest
//! argument split) and grounded on `gcode/gcode.cpp`'s `tokenize`/`parse` for
//! the exact comment/argument semantics: `;` starts a comment that runs to
//! end of line, a word's key is its leading alphabetic run and its value is
//! everything after that (parsed as `f64`, defaulting to `0.0` if empty).

use std::collections::HashMap;

/// One parsed G-code line: its command word (e.g. `"G1"`) and its arguments
/// keyed by letter, value already `f64`-parsed (`gc::command::_arguments`).
#[derive(Debug, Clone, PartialEq)]
pub struct GcodeLine {
    pub line_number: usize,
    pub command: String,
    pub args: HashMap<String, f64>,
}

impl GcodeLine {
    pub fn has_argument(&self, key: &str) -> bool {
        self.args.contains_key(key)
    }

    /// Mirrors `gc::command::has_argument_not`: true if the key is present
    /// and differs from `comparand` — used by G0/G1 to decide whether an
    /// axis actually moved.
    pub fn has_argument_not(&self, key: &str, comparand: f64) -> bool {
        matches!(self.args.get(key), Some(v) if *v != comparand)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.args.get(key).copied().unwrap_or(default)
    }

    /// Rounds to the nearest integer (`llround`), rejecting negative values
    /// (`gc::command::get_argument<uint>`'s `exit(1)`, reported here instead
    /// of aborting the process).
    pub fn get_u32(&self, key: &str, default: u32) -> Result<u32, crate::error::ParseError> {
        match self.args.get(key) {
            None => Ok(default),
            Some(v) if *v < 0.0 => Err(crate::error::ParseError::NegativeUnsignedArgument {
                line: self.line_number,
                key: key.to_string(),
                value: *v,
            }),
            Some(v) => Ok(v.round() as u32),
        }
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Splits a word into its leading-alphabetic key and the remaining value
/// text, matching `gcode.cpp::parse`'s character-class scan (the key stops
/// accumulating the instant a non-alphabetic character appears).
fn split_word(word: &str) -> (String, &str) {
    let split_at = word.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(word.len());
    (word[..split_at].to_ascii_uppercase(), &word[split_at..])
}

/// Tokenizes a whole file's text into one [`GcodeLine`] per non-blank,
/// non-comment-only source line. `line_number` is 1-based for diagnostics.
pub fn tokenize(text: &str) -> Vec<GcodeLine> {
    let mut out = Vec::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let code = strip_comment(raw_line);
        let mut words = code.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        let mut args = HashMap::new();
        for word in words {
            let (key, value) = split_word(word);
            if key.is_empty() {
                continue;
            }
            let parsed = if value.is_empty() { 0.0 } else { value.parse().unwrap_or(0.0) };
            args.insert(key, parsed);
        }

        out.push(GcodeLine {
            line_number: idx + 1,
            command: command.to_ascii_uppercase(),
            args,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_and_whitespace() {
        let lines = tokenize("G1 X10 Y20 ; move over there\n; a pure comment line\nG28\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].command, "G1");
        assert_eq!(lines[0].get_f64("X", 0.0), 10.0);
        assert_eq!(lines[0].get_f64("Y", 0.0), 20.0);
        assert_eq!(lines[1].command, "G28");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let lines = tokenize("\n\nG0 X1\n\n");
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn value_with_no_digits_defaults_to_zero() {
        let lines = tokenize("M106 P\n");
        assert_eq!(lines[0].get_f64("P", -1.0), 0.0);
    }

    #[test]
    fn negative_unsigned_argument_is_rejected() {
        let lines = tokenize("M104 S-5\n");
        let err = lines[0].get_u32("S", 0).unwrap_err();
        assert!(matches!(err, crate::error::ParseError::NegativeUnsignedArgument { .. }));
    }

    #[test]
    fn command_word_is_uppercased() {
        let lines = tokenize("g1 x10\n");
        assert_eq!(lines[0].command, "G1");
        assert_eq!(lines[0].get_f64("X", 0.0), 10.0);
    }
}
