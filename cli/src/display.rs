//! Plain-text rendering of engine state and room listings.

#[cfg(test)]
#[path = "display_test.rs"]
mod display_test;

use std::fmt::Write as _;

use layers::consts::UNOWNED;
use layers::engine::ProtocolEngine;
use serde::Deserialize;

/// One row of the relay's public room listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomRow {
    pub name: String,
    pub online_user_count: usize,
}

/// Layer stack (top first) followed by who is online.
pub fn render_state(engine: &ProtocolEngine) -> String {
    let me = engine.local_user();
    let active = engine.registry().active();
    let directory = engine.directory();
    let mut out = String::new();

    for (height, layer) in engine.registry().iter().enumerate() {
        let owner = if layer.owner == UNOWNED {
            "unowned".to_string()
        } else if layer.owner == me {
            format!("{} (you)", directory.name(layer.owner))
        } else {
            directory.name(layer.owner)
        };
        let marker = if active == Some(layer.id) { '*' } else { ' ' };
        let kind = layer.kind().as_str();
        let _ = writeln!(out, "{marker}{height:>3}  #{:<4} {kind:<11} {:<24} {owner}", layer.id, layer.name);
    }
    if engine.registry().is_empty() {
        out.push_str("  (no layers)\n");
    }

    let online: Vec<String> =
        directory.online_users().map(|id| format!("{} [{id}]", directory.name(id))).collect();
    let _ = writeln!(out, "online: {}", online.join(", "));
    out
}

pub fn render_rooms(rooms: &[RoomRow]) -> String {
    if rooms.is_empty() {
        return "no public rooms\n".to_string();
    }
    let mut out = String::new();
    for room in rooms {
        let _ = writeln!(out, "{:>4}  {}", room.online_user_count, room.name);
    }
    out
}

/// `GET /api/rooms` on the relay behind a websocket URL.
pub fn rooms_url(ws_url: &str) -> Option<String> {
    let (scheme, rest) = ws_url.split_once("://")?;
    let http = match scheme {
        "ws" => "http",
        "wss" => "https",
        _ => return None,
    };
    let host = rest.split('/').next().filter(|h| !h.is_empty())?;
    Some(format!("{http}://{host}/api/rooms"))
}
