//! User-facing reply texts.

use crate::error::TurnError;
use crate::types::Reply;

pub const MODIFY_LOCKED: &str = "內容已經翻譯，無法再修改。如需調整，請輸入 new 重新開始。";
pub const NOTHING_TO_MODIFY: &str = "目前還沒有可以修改的內容，請先輸入衛教主題。";
pub const GENERATE_FIRST: &str = "請先輸入衛教主題產生內容。";
pub const INVALID_EMAIL: &str = "Email 格式不正確，請重新輸入，例如 user@example.com";
pub const AMBIGUOUS: &str = "請一次只輸入一個指令。";
pub const BUSY: &str = "上一則訊息還在處理中，請稍候再試。";
pub const DISCARDED: &str = "對話已重新開始，先前的請求結果已捨棄。";
pub const VOICE_DISABLED: &str = "目前不支援語音訊息，請改用文字輸入。";
pub const FAILURE: &str = "系統暫時無法處理您的請求，請稍後再試。";
pub const TIMEOUT: &str = "回應時間過長，請稍後再試。";
pub const STORE_FULL: &str = "系統目前忙碌中，請稍後再試。";

const EDUCATION_COMMANDS: [&str; 4] = ["modify", "translate", "mail", "new"];

fn education_menu() -> Vec<&'static str> {
    EDUCATION_COMMANDS.to_vec()
}

pub fn needs_start() -> Reply {
    Reply::text("請輸入 new 開始產生衛教單張，或輸入 chat 進入即時翻譯。")
        .with_quick_replies(["new", "chat"])
}

pub fn education_started() -> Reply {
    Reply::text("已開始新的衛教對話，請輸入衛教主題，例如「糖尿病 飲食」。")
}

pub fn help() -> Reply {
    Reply::text(
        "可用指令：\n\
         new：重新開始\n\
         modify：修改內容\n\
         translate：翻譯內容\n\
         mail：寄送內容\n\
         chat：即時翻譯模式",
    )
    .with_quick_replies(education_menu())
}

pub fn ambiguous() -> Reply {
    Reply::text(AMBIGUOUS)
}

pub fn modify_locked() -> Reply {
    Reply::text(MODIFY_LOCKED).with_quick_replies(["mail", "new"])
}

pub fn nothing_to_modify() -> Reply {
    Reply::text(NOTHING_TO_MODIFY)
}

pub fn generate_first() -> Reply {
    Reply::text(GENERATE_FIRST)
}

pub fn ask_modify_instruction() -> Reply {
    Reply::text("請輸入要如何修改內容，例如「加強飲食建議」。")
}

pub fn ask_translate_target(languages: &[String]) -> Reply {
    Reply::text("請輸入要翻譯成哪一種語言。").with_quick_replies(languages.iter().cloned())
}

pub fn ask_recipient() -> Reply {
    Reply::text("請輸入收件人 Email。")
}

pub fn invalid_email() -> Reply {
    Reply::text(INVALID_EMAIL)
}

pub fn generated(content: &str) -> Reply {
    Reply::text(content).with_quick_replies(education_menu())
}

pub fn translated(language: &str, content: &str) -> Reply {
    Reply::text(format!("【{language}】\n{content}")).with_quick_replies(["mail", "new"])
}

pub fn mailed(recipient: &str) -> Reply {
    Reply::text(format!("已寄送至 {recipient}。")).with_quick_replies(education_menu())
}

pub fn ask_chat_language(languages: &[String]) -> Reply {
    Reply::text("請選擇或輸入要翻譯成的語言。").with_quick_replies(languages.iter().cloned())
}

pub fn unknown_language(languages: &[String]) -> Reply {
    Reply::text("無法辨識語言名稱，請從下方選擇或重新輸入。")
        .with_quick_replies(languages.iter().cloned())
}

pub fn chat_ready(language: &str) -> Reply {
    Reply::text(format!("已設定翻譯語言：{language}。請輸入要說明的內容。"))
}

pub fn chat_result(plain_text: &str, translated: &str) -> Reply {
    Reply::text(format!("{plain_text}\n\n{translated}")).with_quick_replies(["new", "chat"])
}

pub fn chat_hint(language: &str) -> Reply {
    Reply::text(format!(
        "即時翻譯模式（{language}）不支援此指令。請直接輸入內容，或輸入 new 回到衛教模式。"
    ))
}

/// What the user sees when a turn ends in an error.
pub fn for_error(err: &TurnError) -> Reply {
    match err {
        TurnError::Collaborator(e) if e.is_timeout() => Reply::text(TIMEOUT),
        TurnError::Collaborator(_) => Reply::text(FAILURE),
        TurnError::Store(_) => Reply::text(STORE_FULL),
    }
}

pub fn busy() -> Reply {
    Reply::text(BUSY)
}

pub fn discarded() -> Reply {
    Reply::text(DISCARDED)
}

pub fn voice_disabled() -> Reply {
    Reply::text(VOICE_DISABLED)
}

/// Subject line for a mailed leaflet.
pub fn mail_subject(topic: &str) -> String {
    format!("衛教單張：{topic}")
}

/// Mail body: primary content, then the translation when there is one.
pub fn mail_body(primary: &str, translation: Option<(&str, &str)>) -> String {
    match translation {
        Some((language, content)) => format!("{primary}\n\n--- {language} ---\n{content}"),
        None => primary.to_string(),
    }
}
