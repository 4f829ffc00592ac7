//! Text fitting: make block text printable with the builtin PDF fonts.
//!
//! The standard Times faces are single-byte fonts, so anything outside
//! printable ASCII would come out as mojibake. These deterministic passes run
//! on every block, in this order:
//!
//! 1. Normalise line endings (CRLF / CR → LF) and expand tabs
//! 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, joiners)
//! 3. Map typographic punctuation and common accented letters to ASCII
//! 4. Replace whatever is left outside printable ASCII with `?`

use crate::model::LayoutBlock;

/// Apply every rule to the text fields of `block` in place.
pub fn fit_block_text(block: &mut LayoutBlock) {
    match block {
        LayoutBlock::Heading { text, .. }
        | LayoutBlock::Paragraph { text }
        | LayoutBlock::ListItem { text } => *text = fit_text(text),
        LayoutBlock::Table { rows, .. } => {
            for cell in rows.iter_mut().flatten() {
                cell.text = fit_text(&cell.text);
            }
        }
        LayoutBlock::Image { .. } => {}
    }
}

/// Apply every rule to a string.
pub fn fit_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    to_printable_ascii(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\t', "    ")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rules 3 + 4: Transliterate, then replace the rest ───────────────────────

fn to_printable_ascii(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '\n' || (' '..='~').contains(&c) {
            out.push(c);
        } else if let Some(s) = transliterate(c) {
            out.push_str(s);
        } else if c.is_whitespace() {
            out.push(' ');
        } else {
            out.push('?');
        }
    }
    out
}

fn transliterate(c: char) -> Option<&'static str> {
    let s = match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' | '«' | '»' => "\"",
        '\u{2010}'..='\u{2015}' | '\u{2212}' => "-",
        '\u{2026}' => "...",
        '\u{2022}' | '\u{00B7}' | '\u{2023}' | '\u{25E6}' => "-",
        '\u{00A0}' | '\u{2002}'..='\u{200A}' | '\u{202F}' => " ",
        '\u{2192}' => "->",
        '\u{2190}' => "<-",
        '\u{00D7}' => "x",
        '\u{00A9}' => "(c)",
        '\u{00AE}' => "(R)",
        '\u{2122}' => "(TM)",
        '\u{00B0}' => " deg",
        '\u{20AC}' => "EUR",
        '\u{00E0}'..='\u{00E5}' => "a",
        '\u{00C0}'..='\u{00C5}' => "A",
        '\u{00E8}'..='\u{00EB}' => "e",
        '\u{00C8}'..='\u{00CB}' => "E",
        '\u{00EC}'..='\u{00EF}' => "i",
        '\u{00CC}'..='\u{00CF}' => "I",
        '\u{00F2}'..='\u{00F6}' | '\u{00F8}' => "o",
        '\u{00D2}'..='\u{00D6}' | '\u{00D8}' => "O",
        '\u{00F9}'..='\u{00FC}' => "u",
        '\u{00D9}'..='\u{00DC}' => "U",
        '\u{00E7}' => "c",
        '\u{00C7}' => "C",
        '\u{00F1}' => "n",
        '\u{00D1}' => "N",
        '\u{00FD}' | '\u{00FF}' => "y",
        '\u{00DD}' => "Y",
        '\u{00DF}' => "ss",
        '\u{00E6}' => "ae",
        '\u{00C6}' => "AE",
        '\u{0153}' => "oe",
        '\u{0152}' => "OE",
        _ => return None,
    };
    Some(s)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableCell;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc\td"), "a\nb\nc    d");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_typographic_punctuation() {
        assert_eq!(
            fit_text("\u{201C}Quoted\u{201D} \u{2014} it\u{2019}s\u{2026}"),
            "\"Quoted\" - it's..."
        );
    }

    #[test]
    fn test_accented_letters() {
        assert_eq!(fit_text("Café Größe Ñandú"), "Cafe Grosse Nandu");
    }

    #[test]
    fn test_unmappable_becomes_question_mark() {
        assert_eq!(fit_text("日本 ok"), "?? ok");
    }

    #[test]
    fn test_newlines_survive() {
        assert_eq!(fit_text("one\r\ntwo"), "one\ntwo");
    }

    #[test]
    fn test_block_fitting_touches_table_cells() {
        let mut block = LayoutBlock::Table {
            columns: 1,
            rows: vec![vec![TableCell::new("na\u{00EF}ve", true)]],
        };
        fit_block_text(&mut block);
        let LayoutBlock::Table { rows, .. } = block else { unreachable!() };
        assert_eq!(rows[0][0].text, "naive");
    }
}
