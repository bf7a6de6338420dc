//! Japanese script detection.

/// Hiragana, Katakana (plus phonetic extensions and half-width forms) and
/// the common CJK ideograph block.
pub fn is_alternate_char(c: char) -> bool {
    matches!(
        c,
        '\u{3040}'..='\u{309F}'
            | '\u{30A0}'..='\u{30FF}'
            | '\u{31F0}'..='\u{31FF}'
            | '\u{FF65}'..='\u{FF9F}'
            | '\u{4E00}'..='\u{9FFF}'
    )
}

/// True when the text contains at least one alternate-script code point.
pub fn is_alternate_script(text: &str) -> bool {
    text.chars().any(is_alternate_char)
}
