//! Lightweight character-range language discrimination (§4.1).
//!
//! A query may mix scripts; the detector labels the dominant script so the
//! LLM router can pick a matching prompt bundle. The keyword router ignores
//! this and applies both lexicons simultaneously regardless of the label.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Zh,
    En,
    Other,
}

/// Count CJK-range characters vs. Latin-range characters and pick whichever
/// is more frequent; ties and scripts with neither go to `Other`.
pub fn detect(text: &str) -> Language {
    let mut cjk = 0usize;
    let mut latin = 0usize;

    for ch in text.chars() {
        let code = ch as u32;
        let is_cjk = (0x4E00..=0x9FFF).contains(&code)
            || (0x3400..=0x4DBF).contains(&code)
            || (0xF900..=0xFAFF).contains(&code);
        if is_cjk {
            cjk += 1;
            continue;
        }
        if ch.is_ascii_alphabetic() {
            latin += 1;
        }
    }

    match (cjk, latin) {
        (0, 0) => Language::Other,
        (c, l) if c > l => Language::Zh,
        (c, l) if l > c => Language::En,
        _ => Language::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_chinese() {
        assert_eq!(detect("澳門現在的濕度是多少？"), Language::Zh);
    }

    #[test]
    fn detects_english() {
        assert_eq!(detect("What is the weather in Macau?"), Language::En);
    }

    #[test]
    fn mixed_script_picks_majority() {
        assert_eq!(detect("Macau 天氣 天氣 天氣"), Language::Zh);
    }

    #[test]
    fn numeric_only_is_other() {
        assert_eq!(detect("2^10"), Language::Other);
    }
}
