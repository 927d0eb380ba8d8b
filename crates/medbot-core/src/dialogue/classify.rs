use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::KeywordConfig;
use crate::session::{Awaiting, Mode, Session};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("email pattern is valid"));

/// What a single user message means given the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Start (or restart) a conversation in the given mode.
    Start(Mode),
    Modify,
    Translate,
    Mail,
    /// Answer to an open modify prompt.
    ModifyInstruction(String),
    /// Answer to an open translate-target or chat-language prompt.
    LanguageSupply(String),
    /// Answer to an open recipient prompt. Not yet validated.
    EmailSupply(String),
    /// New topic (education) or source text (chat).
    ContentRequest(String),
    AmbiguousMultiCommand,
    NeedsStart,
    Unrecognized,
}

/// Command categories a keyword can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start(Mode),
    Modify,
    Translate,
    Mail,
}

/// Trim and lowercase Latin-script letters. Other scripts are left as typed.
pub fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .flat_map(|c| {
            let folded: Vec<char> = if is_latin(c) {
                c.to_lowercase().collect()
            } else {
                vec![c]
            };
            folded
        })
        .collect()
}

fn is_latin(c: char) -> bool {
    matches!(c as u32,
        0x0041..=0x005A | 0x0061..=0x007A
        | 0x00C0..=0x024F
        | 0x1E00..=0x1EFF
        | 0xFF21..=0xFF3A | 0xFF41..=0xFF5A)
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF      // kana
        | 0x3400..=0x4DBF    // ext A
        | 0x4E00..=0x9FFF    // unified ideographs
        | 0xAC00..=0xD7AF    // hangul
        | 0xF900..=0xFAFF
        | 0x20000..=0x2FA1F)
}

pub fn is_valid_email(text: &str) -> bool {
    EMAIL_RE.is_match(text.trim())
}

/// Short token made only of letters: 1 to 15 characters, no digits,
/// punctuation or whitespace.
pub fn looks_like_language(text: &str) -> bool {
    let text = text.trim();
    let count = text.chars().count();
    (1..=15).contains(&count)
        && text.chars().all(|c| {
            (c.is_alphabetic() || is_cjk(c)) && !c.is_numeric() && !c.is_whitespace()
        })
}

fn contains(set: &std::collections::BTreeSet<String>, normalized: &str) -> bool {
    set.iter().any(|k| normalize(k) == normalized)
}

fn matched_commands(normalized: &str, keywords: &KeywordConfig) -> Vec<Command> {
    let mut found = Vec::new();
    if contains(&keywords.start, normalized) {
        found.push(Command::Start(Mode::Education));
    }
    if contains(&keywords.chat, normalized) {
        found.push(Command::Start(Mode::Chat));
    }
    if contains(&keywords.modify, normalized) {
        found.push(Command::Modify);
    }
    if contains(&keywords.translate, normalized) {
        found.push(Command::Translate);
    }
    if contains(&keywords.mail, normalized) {
        found.push(Command::Mail);
    }
    found
}

/// Interpret `raw_text` against the session. Never mutates anything.
pub fn classify(raw_text: &str, session: &Session, keywords: &KeywordConfig) -> Intent {
    let normalized = normalize(raw_text);
    let answer = raw_text.trim().to_string();

    let matched = matched_commands(&normalized, keywords);

    // Before activation only a lone start keyword means anything.
    if !session.started && !session.awaiting_chat_language() {
        return match matched.as_slice() {
            [Command::Start(mode)] => Intent::Start(*mode),
            _ => Intent::NeedsStart,
        };
    }

    let command = match matched.as_slice() {
        [] => None,
        [one] => Some(*one),
        _ => return Intent::AmbiguousMultiCommand,
    };

    if let Some(Command::Start(mode)) = command {
        return Intent::Start(mode);
    }

    if let Some(awaiting) = session.awaiting {
        if command.is_some() {
            return Intent::AmbiguousMultiCommand;
        }
        return match awaiting {
            Awaiting::ModifyInstruction => Intent::ModifyInstruction(answer),
            Awaiting::TranslateTarget | Awaiting::ChatLanguage => Intent::LanguageSupply(answer),
            Awaiting::RecipientEmail => Intent::EmailSupply(answer),
        };
    }

    match command {
        Some(Command::Modify) => Intent::Modify,
        Some(Command::Translate) => Intent::Translate,
        Some(Command::Mail) => Intent::Mail,
        Some(Command::Start(mode)) => Intent::Start(mode),
        None if session.accepts_content() && !answer.is_empty() => Intent::ContentRequest(answer),
        None => Intent::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Leaflet, Mode};

    fn keywords() -> KeywordConfig {
        KeywordConfig::default()
    }

    fn started(mode: Mode) -> Session {
        let mut s = Session::new("U1");
        s.activate(mode);
        s
    }

    fn with_content() -> Session {
        let mut s = started(Mode::Education);
        s.education_mut().unwrap().leaflet = Some(Leaflet {
            topic: "t".to_string(),
            primary_content: "c".to_string(),
            translation: None,
        });
        s
    }

    #[test]
    fn test_normalize_folds_latin_only() {
        assert_eq!(normalize("  NEW \n"), "new");
        assert_eq!(normalize("Modify"), "modify");
        assert_eq!(normalize("ÉCOLE"), "école");
        assert_eq!(normalize(" 新對話 "), "新對話");
        assert_eq!(normalize("ＮＥＷ"), "ｎｅｗ");
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email(" a@b.c "));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@@b.com"));
        assert!(!is_valid_email("@b.com"));
    }

    #[test]
    fn test_language_heuristic() {
        assert!(looks_like_language("English"));
        assert!(looks_like_language("日本語"));
        assert!(looks_like_language("ไทย"));
        assert!(looks_like_language("Indonesia"));
        assert!(!looks_like_language(""));
        assert!(!looks_like_language("en-US"));
        assert!(!looks_like_language("English 2"));
        assert!(!looks_like_language("please translate this"));
        assert!(!looks_like_language("abcdefghijklmnop"));
    }

    #[test]
    fn test_not_started_only_accepts_start() {
        let s = Session::new("U1");
        let kw = keywords();
        assert_eq!(classify("new", &s, &kw), Intent::Start(Mode::Education));
        assert_eq!(classify("NEW", &s, &kw), Intent::Start(Mode::Education));
        assert_eq!(classify("chat", &s, &kw), Intent::Start(Mode::Chat));
        assert_eq!(classify("modify", &s, &kw), Intent::NeedsStart);
        assert_eq!(classify("糖尿病", &s, &kw), Intent::NeedsStart);
    }

    #[test]
    fn test_start_has_priority_everywhere() {
        let kw = keywords();
        let mut s = with_content();
        s.awaiting = Some(Awaiting::RecipientEmail);
        assert_eq!(classify("開始", &s, &kw), Intent::Start(Mode::Education));
        assert_eq!(classify("聊天", &s, &kw), Intent::Start(Mode::Chat));
    }

    #[test]
    fn test_content_request_before_generation() {
        let kw = keywords();
        let s = started(Mode::Education);
        assert_eq!(
            classify(" 糖尿病 飲食 ", &s, &kw),
            Intent::ContentRequest("糖尿病 飲食".to_string())
        );
        let s = with_content();
        assert_eq!(classify("糖尿病", &s, &kw), Intent::Unrecognized);
    }

    #[test]
    fn test_awaiting_consumes_free_text() {
        let kw = keywords();
        let mut s = with_content();
        s.awaiting = Some(Awaiting::ModifyInstruction);
        assert_eq!(
            classify("emphasize diet", &s, &kw),
            Intent::ModifyInstruction("emphasize diet".to_string())
        );
        s.awaiting = Some(Awaiting::TranslateTarget);
        assert_eq!(
            classify("English", &s, &kw),
            Intent::LanguageSupply("English".to_string())
        );
        s.awaiting = Some(Awaiting::RecipientEmail);
        assert_eq!(
            classify("x@y.z", &s, &kw),
            Intent::EmailSupply("x@y.z".to_string())
        );
    }

    #[test]
    fn test_command_while_awaiting_is_ambiguous() {
        let kw = keywords();
        let mut s = with_content();
        s.awaiting = Some(Awaiting::TranslateTarget);
        assert_eq!(classify("mail", &s, &kw), Intent::AmbiguousMultiCommand);
        assert_eq!(classify("修改", &s, &kw), Intent::AmbiguousMultiCommand);
    }

    #[test]
    fn test_overlapping_keyword_sets_are_ambiguous() {
        let mut kw = keywords();
        kw.mail.insert("translate".to_string());
        let s = with_content();
        assert_eq!(classify("translate", &s, &kw), Intent::AmbiguousMultiCommand);
        assert_eq!(classify("modify", &s, &kw), Intent::Modify);
    }

    #[test]
    fn test_overlapping_keywords_before_start_need_start() {
        let mut kw = keywords();
        kw.mail.insert("translate".to_string());
        kw.chat.insert("new".to_string());
        let s = Session::new("U1");
        assert_eq!(classify("translate", &s, &kw), Intent::NeedsStart);
        assert_eq!(classify("new", &s, &kw), Intent::NeedsStart);
        assert_eq!(classify("開始", &s, &kw), Intent::Start(Mode::Education));
    }

    #[test]
    fn test_commands_signal_shape_only() {
        let kw = keywords();
        let s = started(Mode::Education);
        assert_eq!(classify("modify", &s, &kw), Intent::Modify);
        assert_eq!(classify("翻譯", &s, &kw), Intent::Translate);
        assert_eq!(classify("Email", &s, &kw), Intent::Mail);
    }

    #[test]
    fn test_chat_mode_content() {
        let kw = keywords();
        let mut s = started(Mode::Chat);
        assert_eq!(classify("hello", &s, &kw), Intent::Unrecognized);
        s.awaiting = Some(Awaiting::ChatLanguage);
        assert_eq!(
            classify("English", &s, &kw),
            Intent::LanguageSupply("English".to_string())
        );
        s.awaiting = None;
        s.chat_mut().unwrap().target_language = Some("English".to_string());
        assert_eq!(
            classify("請按時吃藥", &s, &kw),
            Intent::ContentRequest("請按時吃藥".to_string())
        );
    }
}
