// Helpers for turning the free-form text printed by filesystem tools into
// structured values, plus the size arithmetic shared by every driver.

use crate::{ByteValue, Sector, GIBIBYTE, KIBIBYTE, MEBIBYTE, TEBIBYTE};
use log::warn;
use regex::RegexBuilder;

/// Display units for byte quantities. All multiples are binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Byte,
    KiB,
    MiB,
    GiB,
    TiB,
}

impl SizeUnit {
    pub fn bytes(&self) -> ByteValue {
        match self {
            SizeUnit::Byte => 1,
            SizeUnit::KiB => KIBIBYTE,
            SizeUnit::MiB => MEBIBYTE,
            SizeUnit::GiB => GIBIBYTE,
            SizeUnit::TiB => TEBIBYTE,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            SizeUnit::Byte => "B",
            SizeUnit::KiB => "KiB",
            SizeUnit::MiB => "MiB",
            SizeUnit::GiB => "GiB",
            SizeUnit::TiB => "TiB",
        }
    }
}

/// Round half up, `floor(x + 0.5)`.
pub fn round(value: f64) -> Sector {
    (value + 0.5).floor() as Sector
}

/// Express a number of sectors in the given unit.
pub fn sector_to_unit(sectors: Sector, sector_size: ByteValue, unit: SizeUnit) -> f64 {
    match unit {
        SizeUnit::Byte => (sectors * sector_size) as f64,
        _ => sectors as f64 / (unit.bytes() as f64 / sector_size as f64),
    }
}

/// Inverse of [`sector_to_unit`]; the result still needs [`round`].
pub fn unit_to_sectors(value: f64, sector_size: ByteValue, unit: SizeUnit) -> f64 {
    value * (unit.bytes() as f64 / sector_size as f64)
}

/// Re-express a count of `block_size` blocks as a count of `sector_size`
/// sectors. Tools report in their own block size which rarely matches.
pub fn blocks_to_sectors(blocks: Sector, block_size: ByteValue, sector_size: ByteValue) -> Sector {
    round(blocks as f64 * (block_size as f64 / sector_size as f64))
}

/// Human readable size with two decimals, using the largest unit whose
/// threshold the byte count reaches.
pub fn format_size(sectors: Sector, sector_size: ByteValue) -> String {
    let bytes = sectors * sector_size;
    let unit = if bytes < KIBIBYTE {
        SizeUnit::Byte
    } else if bytes < MEBIBYTE {
        SizeUnit::KiB
    } else if bytes < GIBIBYTE {
        SizeUnit::MiB
    } else if bytes < TEBIBYTE {
        SizeUnit::GiB
    } else {
        SizeUnit::TiB
    };
    format!("{:.2} {}", sector_to_unit(sectors, sector_size, unit), unit.suffix())
}

/// First capture group of the first match of `pattern`. Matching is case
/// insensitive and `^`/`$` anchor at line boundaries.
pub fn regexp_label(text: &str, pattern: &str) -> Option<String> {
    let re = match RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
    {
        Ok(re) => re,
        Err(e) => {
            warn!("Invalid extraction pattern {:?}: {}", pattern, e);
            return None;
        }
    };

    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Integer following the first occurrence of `label`, e.g.
/// `extract_integer_after(out, "Block count:")`.
pub fn extract_integer_after(text: &str, label: &str) -> Option<i64> {
    let start = text.find(label)? + label.len();
    leading_integer(&text[start..])
}

/// Integer at the start of the line that contains `marker`. dosfsck prints
/// its figures this way: `    262144 sectors total`.
pub fn integer_at_line_of(text: &str, marker: &str) -> Option<i64> {
    let pos = text.find(marker)?;
    let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    leading_integer(&text[line_start..])
}

/// Parse an optionally signed decimal integer after any leading whitespace.
pub fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let digits_start = usize::from(text.starts_with(['-', '+']));
    let digits = text[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len() - digits_start);
    if digits == 0 {
        return None;
    }
    text[..digits_start + digits].parse().ok()
}

/// Undo the cursor tricks tools use to draw progress.
///
/// A backspace removes itself and the character before it. Within a line, a
/// carriage return that is not part of a CRLF ending hides everything
/// before it, leaving only the text written last.
pub fn cleanup_cursor(text: &str) -> String {
    let mut kept: Vec<char> = Vec::with_capacity(text.len());
    for c in text.chars() {
        if c == '\u{8}' {
            kept.pop();
        } else {
            kept.push(c);
        }
    }
    let without_backspaces: String = kept.into_iter().collect();

    let lines: Vec<&str> = without_backspaces.split('\n').collect();
    let last = lines.len() - 1;
    let mut out = String::with_capacity(without_backspaces.len());
    for (i, line) in lines.iter().enumerate() {
        // Only a CR directly before the LF is a line ending.
        let (body, crlf) = match line.strip_suffix('\r') {
            Some(body) if i < last => (body, true),
            _ => (*line, false),
        };
        out.push_str(body.rsplit('\r').next().unwrap_or(body));
        if crlf {
            out.push('\r');
        }
        if i < last {
            out.push('\n');
        }
    }
    out
}

/// Trim blanks and line endings from both ends.
pub fn trim(text: &str) -> &str {
    text.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

/// FAT volume labels hold at most 11 characters.
pub fn fat_compliant_label(label: &str) -> String {
    label.chars().take(11).collect()
}

/// Wrap a value in double quotes for `sh -c`, escaping the characters the
/// shell still interprets inside them.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
