use chrono::{DateTime, TimeZone, Utc};
use parley_protocol::{Message, RoleType};

/// 2024-01-01 at the given hour and minute, UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

pub fn user_turn(chat_index: &str, text: &str, when: DateTime<Utc>) -> Message {
    Message::new(chat_index, "user", RoleType::User)
        .with_input_query(text)
        .with_role_content(text)
        .at(when)
}

pub fn agent_turn(chat_index: &str, role_name: &str, text: &str, when: DateTime<Utc>) -> Message {
    Message::new(chat_index, role_name, RoleType::Assistant)
        .with_role_content(text)
        .at(when)
}

pub fn summary_turn(chat_index: &str, text: &str, when: DateTime<Utc>) -> Message {
    Message::new(chat_index, "summaryer", RoleType::Summary)
        .with_role_content(text)
        .at(when)
}
