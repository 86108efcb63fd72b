//! Who is in a room and where their cursor is. Nothing here is recorded in
//! the drawing state.

use std::time::{Duration, Instant};

use inkroom_shared::UserInfo;

use crate::rooms::ParticipantId;

const PALETTE: [&str; 8] = [
    "#e63946", "#f4a261", "#2a9d8f", "#457b9d", "#8338ec", "#ff006e", "#3a86ff", "#6a994e",
];
const MAX_COLOR_LEN: usize = 32;
const MAX_NAME_LEN: usize = 48;

/// Stable palette color derived from the participant id.
pub fn default_color(participant: ParticipantId) -> String {
    let index = (participant.as_u128() % PALETTE.len() as u128) as usize;
    PALETTE[index].to_string()
}

pub fn default_display_name(participant: ParticipantId) -> String {
    let simple = participant.simple().to_string();
    format!("Guest-{}", &simple[..4])
}

/// Builds the user entry announced to the room, falling back to generated
/// values for missing or blank fields.
pub fn resolve_user(
    participant: ParticipantId,
    color: Option<String>,
    display_name: Option<String>,
) -> UserInfo {
    let color = clean(color, MAX_COLOR_LEN).unwrap_or_else(|| default_color(participant));
    let display_name =
        clean(display_name, MAX_NAME_LEN).unwrap_or_else(|| default_display_name(participant));
    UserInfo {
        id: participant.to_string(),
        color,
        display_name,
    }
}

fn clean(value: Option<String>, max_chars: usize) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

/// Rate limit for cursor broadcasts of one connection.
pub struct CursorThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl CursorThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn allow(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
