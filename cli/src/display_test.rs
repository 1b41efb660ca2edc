use layers::pixels::CanvasSize;

use super::*;

/// Engine with two layers and two users, as the relay would announce them.
fn engine() -> ProtocolEngine {
    let mut engine = ProtocolEngine::new(CanvasSize::new(16, 16));
    for line in [
        r#"{"type":"set_uid","data":1}"#,
        r#"{"type":"map_usernames","data":{"1":"Ada","2":"Bob"}}"#,
        r#"{"type":"set_online_users","data":[1,2]}"#,
        r#"{"type":"s2c_create_layer","data":{"layer_type":"paint_layer","id":1,"owner":1,"height":0,"name":"Sky"}}"#,
        r#"{"type":"s2c_create_layer","data":{"layer_type":"text_layer","id":2,"owner":0,"height":1,"name":"Title"}}"#,
    ] {
        engine.handle_text(line).unwrap();
    }
    engine
}

#[test]
fn state_lists_layers_top_down_with_owners() {
    let text = render_state(&engine());
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with('*'), "auto-selected own layer is marked: {}", lines[0]);
    assert!(lines[0].contains("#1") && lines[0].contains("paint_layer") && lines[0].contains("Ada (you)"));
    assert!(lines[1].contains("#2") && lines[1].contains("unowned"));
    assert_eq!(lines[2], "online: Ada [1], Bob [2]");
}

#[test]
fn empty_state() {
    let text = render_state(&ProtocolEngine::new(CanvasSize::new(4, 4)));
    assert_eq!(text, "  (no layers)\nonline: \n");
}

#[test]
fn rooms_are_listed_in_order() {
    let rooms = vec![
        RoomRow { name: "art".into(), online_user_count: 12 },
        RoomRow { name: "Quiet".into(), online_user_count: 0 },
    ];
    assert_eq!(render_rooms(&rooms), "  12  art\n   0  Quiet\n");
    assert_eq!(render_rooms(&[]), "no public rooms\n");
}

#[test]
fn rooms_url_follows_ws_url() {
    assert_eq!(rooms_url("ws://127.0.0.1:8080/ws").as_deref(), Some("http://127.0.0.1:8080/api/rooms"));
    assert_eq!(rooms_url("wss://draw.example/rooms/art/ws").as_deref(), Some("https://draw.example/api/rooms"));
    assert_eq!(rooms_url("http://x/ws"), None);
    assert_eq!(rooms_url("ws:///ws"), None);
}
