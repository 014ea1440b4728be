// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use super::TuningError;

/// Scala's default reference, middle C in 12-TET.
const MIDDLE_C_FREQ: f64 = 261.625_565_300_598_6;

/// Non-comment lines with their 1-based line numbers.
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.starts_with('!'))
}

fn parse_error(line: usize, msg: impl Into<String>) -> TuningError {
    TuningError::Parse {
        line,
        msg: msg.into(),
    }
}

fn first_token(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// A `.scl` scale. Unison is implicit; the last degree is the period.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Scale {
    pub description: String,
    ratios: Vec<f64>,
}

impl Scale {
    pub fn parse(text: &str) -> Result<Scale, TuningError> {
        let mut lines = content_lines(text);
        let (_, description) = lines
            .next()
            .ok_or_else(|| parse_error(1, "missing description"))?;

        let (line, count) = lines
            .by_ref()
            .find(|(_, line)| !line.is_empty())
            .ok_or_else(|| parse_error(2, "missing pitch count"))?;
        let count: usize = first_token(count)
            .parse()
            .map_err(|_| parse_error(line, "invalid pitch count"))?;
        if count == 0 {
            return Err(TuningError::EmptyScale);
        }

        let mut ratios = Vec::with_capacity(count);
        let mut last_line = line;
        for (line, text) in lines.filter(|(_, line)| !line.is_empty()).take(count) {
            ratios.push(parse_pitch(first_token(text), line)?);
            last_line = line;
        }
        if ratios.len() < count {
            return Err(parse_error(
                last_line + 1,
                format!("expected {} pitches, found {}", count, ratios.len()),
            ));
        }

        Ok(Scale {
            description: description.to_string(),
            ratios,
        })
    }

    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    /// The frequency ratio of a degree relative to unison. Degrees past the
    /// scale repeat it, one period up.
    pub fn ratio(&self, degree: i64) -> f64 {
        let n = self.ratios.len() as i64;
        let period = self.ratios[self.ratios.len() - 1];
        let octave = degree.div_euclid(n);
        let index = degree.rem_euclid(n) as usize;
        let base = if index == 0 {
            1.0
        } else {
            self.ratios[index - 1]
        };
        base * period.powi(octave as i32)
    }
}

/// A pitch is in cents when it has a period, otherwise it is a ratio.
fn parse_pitch(token: &str, line: usize) -> Result<f64, TuningError> {
    let ratio = if token.contains('.') {
        let cents: f64 = token
            .parse()
            .map_err(|_| parse_error(line, format!("invalid cents value {}", token)))?;
        (cents / 1200.0).exp2()
    } else {
        let (num, den) = token.split_once('/').unwrap_or((token, "1"));
        let num: u64 = num
            .parse()
            .map_err(|_| parse_error(line, format!("invalid ratio {}", token)))?;
        let den: u64 = den
            .parse()
            .map_err(|_| parse_error(line, format!("invalid ratio {}", token)))?;
        if num == 0 || den == 0 {
            return Err(parse_error(line, format!("invalid ratio {}", token)));
        }
        num as f64 / den as f64
    };

    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(parse_error(line, format!("invalid pitch {}", token)));
    }
    Ok(ratio)
}

/// A `.kbm` keyboard mapping.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct KeyboardMap {
    size: usize,
    pub first: u8,
    pub last: u8,
    pub middle: u8,
    pub reference_note: u8,
    pub reference_freq: f64,
    octave_degree: usize,
    mapping: Vec<Option<i64>>,
}

impl Default for KeyboardMap {
    fn default() -> Self {
        KeyboardMap {
            size: 0,
            first: 0,
            last: 127,
            middle: 60,
            reference_note: 60,
            reference_freq: MIDDLE_C_FREQ,
            octave_degree: 0,
            mapping: Vec::new(),
        }
    }
}

impl KeyboardMap {
    pub fn parse(text: &str) -> Result<KeyboardMap, TuningError> {
        let mut lines = content_lines(text).filter(|(_, line)| !line.is_empty());
        let mut last_line = 0;
        let mut next_field = |name: &str| -> Result<(usize, String), TuningError> {
            match lines.next() {
                Some((line, text)) => {
                    last_line = line;
                    Ok((line, first_token(text).to_string()))
                }
                None => Err(parse_error(last_line + 1, format!("missing {}", name))),
            }
        };

        let size = parse_field::<usize>(next_field("map size")?, "map size")?;
        let first = parse_note(next_field("first note")?, "first note")?;
        let last = parse_note(next_field("last note")?, "last note")?;
        let middle = parse_note(next_field("middle note")?, "middle note")?;
        let reference_note = parse_note(next_field("reference note")?, "reference note")?;
        let (line, freq) = next_field("reference frequency")?;
        let reference_freq = parse_field::<f64>((line, freq), "reference frequency")?;
        if !reference_freq.is_finite() || reference_freq <= 0.0 {
            return Err(parse_error(line, "reference frequency must be positive"));
        }
        let octave_degree = parse_field::<usize>(next_field("octave degree")?, "octave degree")?;

        let mut mapping = Vec::with_capacity(size);
        for _ in 0..size {
            let Ok((line, entry)) = next_field("mapping entry") else {
                // Missing entries are unmapped.
                mapping.push(None);
                continue;
            };
            if entry.eq_ignore_ascii_case("x") {
                mapping.push(None);
            } else {
                mapping.push(Some(parse_field::<i64>((line, entry), "mapping entry")?));
            }
        }

        Ok(KeyboardMap {
            size,
            first,
            last,
            middle,
            reference_note,
            reference_freq,
            octave_degree,
            mapping,
        })
    }

    /// The scale degree a note plays, or `None` when it is unmapped.
    pub fn degree(&self, note: u8, period_degree: i64) -> Option<i64> {
        let offset = note as i64 - self.middle as i64;
        if self.size == 0 {
            return Some(offset);
        }
        let size = self.size as i64;
        let octave = offset.div_euclid(size);
        let entry = self.mapping[offset.rem_euclid(size) as usize]?;
        let octave_degree = if self.octave_degree == 0 {
            period_degree
        } else {
            self.octave_degree as i64
        };
        Some(entry + octave * octave_degree)
    }
}

fn parse_field<T: std::str::FromStr>(
    (line, text): (usize, String),
    name: &str,
) -> Result<T, TuningError> {
    text.parse()
        .map_err(|_| parse_error(line, format!("invalid {} {}", name, text)))
}

fn parse_note(field: (usize, String), name: &str) -> Result<u8, TuningError> {
    let line = field.0;
    let note = parse_field::<u8>(field, name)?;
    if note > 127 {
        return Err(parse_error(line, format!("{} out of range", name)));
    }
    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pitch() {
        assert_eq!(parse_pitch("2/1", 1).expect("ratio"), 2.0);
        assert_eq!(parse_pitch("3", 1).expect("integer"), 3.0);
        assert!((parse_pitch("1200.0", 1).expect("cents") - 2.0).abs() < 1e-12);
        assert!((parse_pitch("-1200.", 1).expect("cents") - 0.5).abs() < 1e-12);
        assert!(parse_pitch("1/0", 1).is_err());
        assert!(parse_pitch("", 1).is_err());
    }

    #[test]
    fn test_scale_ratio_repeats() {
        let scale = Scale::parse("fifths\n2\n3/2\n2/1\n").expect("parse");
        assert_eq!(scale.len(), 2);
        assert_eq!(scale.ratio(0), 1.0);
        assert_eq!(scale.ratio(1), 1.5);
        assert_eq!(scale.ratio(2), 2.0);
        assert_eq!(scale.ratio(3), 3.0);
        assert_eq!(scale.ratio(-1), 0.75);
    }

    #[test]
    fn test_empty_description() {
        let scale = Scale::parse("!\n\n1\n2/1\n").expect("parse");
        assert_eq!(scale.description, "");
        assert_eq!(scale.len(), 1);
    }

    #[test]
    fn test_missing_mapping_entries_are_unmapped() {
        let map = KeyboardMap::parse("3\n0\n127\n60\n60\n261.6\n3\n0\n1\n").expect("parse");
        assert_eq!(map.degree(60, 3), Some(0));
        assert_eq!(map.degree(61, 3), Some(1));
        assert_eq!(map.degree(62, 3), None);
        assert_eq!(map.degree(63, 3), Some(3));
    }
}
