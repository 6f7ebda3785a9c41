//! Emergency message text and browser-native deep links.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::event::EmergencyEvent;

/// Maximum length of a single SMS.
pub const SMS_MAX_CHARS: usize = 160;

const ELLIPSIS: &str = "...";

/// Characters left alone by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Build the message sent to every contact for `event`.
#[must_use]
pub fn emergency_message(event: &EmergencyEvent, maps_base_url: &str) -> String {
    format!(
        "EMERGENCY: Helmet user detected a crash!\nSeverity: {}\nLocation: {}\nTime: {}",
        event.severity(),
        event.location().maps_url(maps_base_url),
        event.triggered_at().format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Clamp `message` to one SMS, ending in `...` when cut.
#[must_use]
pub fn truncate_sms(message: &str) -> String {
    if message.chars().count() <= SMS_MAX_CHARS {
        return message.to_string();
    }
    let keep = SMS_MAX_CHARS - ELLIPSIS.len();
    let mut truncated: String = message.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Strip a phone down to what an `sms:` URI accepts.
fn link_phone(phone: &str) -> String {
    phone
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// `sms:` deep link that opens the messaging app with `body` prefilled.
#[must_use]
pub fn sms_link(phone: &str, body: &str) -> String {
    format!("sms:{}?body={}", link_phone(phone), encode(body))
}

/// `mailto:` deep link with subject and body prefilled.
#[must_use]
pub fn mailto_link(email: &str, subject: &str, body: &str) -> String {
    format!(
        "mailto:{}?subject={}&body={}",
        email.trim(),
        encode(subject),
        encode(body)
    )
}
