use layers::pixels::CanvasSize;

use super::*;

const ME: u32 = 1;

/// Engine holding layer 4, owned by `owner`.
fn engine_with_layer(owner: u32) -> ProtocolEngine {
    let mut engine = ProtocolEngine::new(CanvasSize::new(8, 8));
    engine.handle_text(r#"{"type":"set_uid","data":1}"#).unwrap();
    let created = format!(
        r#"{{"type":"s2c_create_layer","data":{{"layer_type":"paint_layer","id":4,"owner":{owner},"height":0,"name":"L"}}}}"#
    );
    engine.handle_text(&created).unwrap();
    engine
}

fn set_owner(engine: &mut ProtocolEngine, owner: u32) {
    let text = format!(r#"{{"type":"set_layer_owner","data":{{"layer":4,"new_owner":{owner}}}}}"#);
    engine.handle_text(&text).unwrap();
}

#[test]
fn claim_pending_until_owner_moves() {
    let mut engine = engine_with_layer(UNOWNED);
    assert!(ownership_settled(&engine, 4, UNOWNED, ME).is_none());
    set_owner(&mut engine, ME);
    assert!(matches!(ownership_settled(&engine, 4, UNOWNED, ME), Some(Ok(()))));
}

#[test]
fn claim_lost_to_another_user_stops_waiting() {
    let mut engine = engine_with_layer(UNOWNED);
    set_owner(&mut engine, 9);
    let outcome = ownership_settled(&engine, 4, UNOWNED, ME);
    assert!(matches!(outcome, Some(Err(CliError::OwnerChanged { layer: 4, owner: 9 }))));
}

#[test]
fn release_settles_on_unowned() {
    let mut engine = engine_with_layer(ME);
    assert!(ownership_settled(&engine, 4, ME, UNOWNED).is_none());
    set_owner(&mut engine, UNOWNED);
    assert!(matches!(ownership_settled(&engine, 4, ME, UNOWNED), Some(Ok(()))));
}

#[test]
fn deleted_layer_stops_waiting() {
    let mut engine = engine_with_layer(UNOWNED);
    engine.handle_text(r#"{"type":"s2c_delete_layer","data":4}"#).unwrap();
    let outcome = ownership_settled(&engine, 4, UNOWNED, ME);
    assert!(matches!(outcome, Some(Err(CliError::LayerGone(4)))));
    assert_eq!(outcome.map(|r| r.unwrap_err().error_code()), Some("E_LAYER_GONE"));
}
