//! Text matching for the reservation calendar and listing cells.
//!
//! Column headers carry the day of month as `3日`; row headers carry the
//! start hour in full-width digits (`９`). Numbers are compared as numbers so
//! day 3 never matches a `13日` column and hour 9 never matches `１９`.

use std::fmt;

const FULL_WIDTH_ZERO: u32 = '０' as u32;

/// Render `value` with ASCII digits replaced by their full-width forms.
pub fn full_width_digits(value: impl fmt::Display) -> String {
    value
        .to_string()
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32(FULL_WIDTH_ZERO + d).unwrap_or(c),
            None => c,
        })
        .collect()
}

fn digit(c: char) -> Option<u32> {
    match c {
        '0'..='9' => c.to_digit(10),
        '０'..='９' => Some(c as u32 - FULL_WIDTH_ZERO),
        _ => None,
    }
}

fn number(digits: impl Iterator<Item = u32>) -> Option<u32> {
    digits.fold(None, |acc, d| Some(acc.unwrap_or(0) * 10 + d))
}

/// The number a row header starts with, ignoring leading whitespace.
pub fn leading_number(text: &str) -> Option<u32> {
    number(text.trim_start().chars().map_while(digit))
}

/// Day of month in a column header such as `11/3日(月)`.
pub fn header_day(text: &str) -> Option<u32> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == '日')
        .find_map(|(i, _)| {
            let start = chars[..i]
                .iter()
                .rposition(|c| digit(*c).is_none())
                .map_or(0, |p| p + 1);
            number(chars[start..i].iter().filter_map(|c| digit(*c)))
        })
}

/// Position `(row, column)` of the calendar cell for `day` at `hour`.
///
/// `headers` are the `thead th` texts including the corner cell, `rows` the
/// `tbody th` texts. The column index counts the row header, which is how
/// `td:nth-child` counts it too.
pub fn locate_cell(headers: &[String], rows: &[String], day: u32, hour: u8) -> Option<(usize, usize)> {
    let column = headers
        .iter()
        .position(|h| header_day(h) == Some(day))?;
    let row = rows
        .iter()
        .position(|r| leading_number(r) == Some(u32::from(hour)))?;
    Some((row, column))
}

/// Cell text with an embedded caption removed, e.g. `施設 日比谷公園` minus
/// `施設`.
pub fn strip_caption(cell: &str, caption: &str) -> String {
    let caption = caption.trim();
    let text = if caption.is_empty() {
        cell.to_string()
    } else {
        cell.replacen(caption, "", 1)
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
