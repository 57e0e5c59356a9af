//! Normalizes raw recognizer output: language/event tag extraction, empty-content filtering.

use crate::models::{Event, Language, RawRecognition};

/// Inline marker delimiters used by recognizers to annotate language and events, e.g.
/// `<|en|>hello <|laugh|>`.
const TAG_OPEN: char = '<';
const TAG_CLOSE: char = '>';

/// The outcome of formatting a [`RawRecognition`]: either usable display text with its
/// structured events, or the "empty" sentinel, which is dropped silently by `Session`.
pub enum Formatted {
    Text {
        text: String,
        language: Option<Language>,
        events: Vec<Event>,
        confidence: f32,
    },
    Empty,
}

/// Strips inline tags from `raw.text`, resolves a language (preferring an inline tag over
/// `raw.language`), maps event tags to the fixed enum, and trims the remainder. Text with no
/// letter/digit/CJK character after trimming is reported as [`Formatted::Empty`].
pub fn format(raw: &RawRecognition) -> Formatted {
    let mut language = raw.language;
    let mut events = raw.events.clone();
    let mut text = String::with_capacity(raw.text.len());

    let mut chars = raw.text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == TAG_OPEN {
            let mut tag = String::new();
            let mut closed = false;
            for next in chars.by_ref() {
                if next == TAG_CLOSE {
                    closed = true;
                    break;
                }
                tag.push(next);
            }
            if !closed {
                // Unterminated tag marker: treat the rest as literal text rather than dropping it.
                text.push(c);
                text.push_str(&tag);
                continue;
            }
            let tag = tag.trim_start_matches('|').trim_end_matches('|');
            if let Some(lang) = Language::from_tag(tag) {
                language = Some(lang);
            } else if let Some(event) = event_from_tag(tag) {
                events.push(event);
            }
            // Unknown tags are silently dropped from the display text.
            continue;
        }
        text.push(c);
    }

    let trimmed = text.trim().to_string();
    if !trimmed.chars().any(is_letter_digit_or_cjk) {
        return Formatted::Empty;
    }

    Formatted::Text {
        text: trimmed,
        language,
        events,
        confidence: raw.confidence,
    }
}

fn event_from_tag(tag: &str) -> Option<Event> {
    match tag.to_ascii_lowercase().as_str() {
        "laugh" | "laughter" => Some(Event::Laugh),
        "applause" | "clap" => Some(Event::Applause),
        "music" => Some(Event::Music),
        "bgm" => Some(Event::Bgm),
        "cry" => Some(Event::Cry),
        "cough" => Some(Event::Cough),
        "sigh" => Some(Event::Sigh),
        "neutral" => Some(Event::Neutral),
        _ => None,
    }
}

fn is_letter_digit_or_cjk(c: char) -> bool {
    if c.is_alphanumeric() {
        return true;
    }
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3040..=0x30FF // Hiragana/Katakana
        | 0xAC00..=0xD7A3 // Hangul syllables
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> RawRecognition {
        RawRecognition {
            text: text.to_string(),
            language: None,
            events: vec![],
            confidence: 0.9,
        }
    }

    #[test]
    fn extracts_language_tag_and_strips_it() {
        match format(&raw("<|en|>hello there")) {
            Formatted::Text { text, language, .. } => {
                assert_eq!(text, "hello there");
                assert_eq!(language, Some(Language::En));
            }
            Formatted::Empty => panic!("expected text"),
        }
    }

    #[test]
    fn maps_event_tag() {
        match format(&raw("<|laugh|>haha")) {
            Formatted::Text { events, .. } => assert_eq!(events, vec![Event::Laugh]),
            Formatted::Empty => panic!("expected text"),
        }
    }

    #[test]
    fn whitespace_only_after_trim_is_empty() {
        match format(&raw("<|en|>   ")) {
            Formatted::Empty => {}
            Formatted::Text { .. } => panic!("expected empty"),
        }
    }

    #[test]
    fn cjk_text_is_not_empty() {
        match format(&raw("你好")) {
            Formatted::Text { text, .. } => assert_eq!(text, "你好"),
            Formatted::Empty => panic!("expected text"),
        }
    }
}
