//! Conversation log properties, exercised through the public API for both backends.
//!
//! Run with: cargo test --test conversation_store

use std::fs;

use tempfile::TempDir;
use xenox::assistant::{
    ConversationStore, ConversationTurn, JsonFileStore, SqliteStore, Store, StoreError, User,
};

fn turn(n: usize) -> ConversationTurn {
    ConversationTurn {
        user_message: format!("message {n}"),
        bot_response: format!("response {n}"),
        arrival_time: format!("2024-01-01T00:00:{:02}Z", n % 60),
        response_time: format!("2024-01-01T00:00:{:02}Z", n % 60),
    }
}

/// Append-only, order-preserving, phone set once.
fn check_append_properties(store: &dyn ConversationStore) {
    let first = User::new(1, "Ana").with_phone("111");
    let later_calls = [User::new(1, "Ana").with_phone("222"), User::new(1, "Ana")];

    store.append_turn(&first, turn(0)).unwrap();
    for (i, user) in later_calls.iter().cycle().take(9).enumerate() {
        store.append_turn(user, turn(i + 1)).unwrap();
    }

    let snapshot = store.load().unwrap();
    let record = &snapshot[&1];
    assert_eq!(record.phone_number, "111");
    assert_eq!(record.turns.len(), 10);
    for (i, t) in record.turns.iter().enumerate() {
        assert_eq!(t, &turn(i));
    }
}

#[test]
fn json_store_append_properties() {
    let dir = TempDir::new().unwrap();
    check_append_properties(&JsonFileStore::new(dir.path().join("conversations.json")));
}

#[test]
fn sqlite_store_append_properties() {
    check_append_properties(&SqliteStore::in_memory().unwrap());
}

#[test]
fn scenario_first_turn_into_empty_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conversations.json");
    let store = JsonFileStore::new(&path);

    let t = ConversationTurn {
        user_message: "Hola bot".to_string(),
        bot_response: "Hola TestUser! Respuesta generada".to_string(),
        arrival_time: "2024-01-01T00:00:00Z".to_string(),
        response_time: "2024-01-01T00:00:01Z".to_string(),
    };
    store.append_turn(&User::new(12345, "TestUser"), t.clone()).unwrap();

    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        on_disk,
        serde_json::json!({
            "12345": {
                "user_id": 12345,
                "first_name": "TestUser",
                "conversations": [{
                    "user_message": "Hola bot",
                    "bot_response": "Hola TestUser! Respuesta generada",
                    "arrival_time": "2024-01-01T00:00:00Z",
                    "response_time": "2024-01-01T00:00:01Z"
                }]
            }
        })
    );

    let record = &store.load().unwrap()[&12345];
    assert_eq!(record.phone_number, "");
    assert_eq!(record.turns, vec![t]);
}

#[test]
fn new_user_leaves_other_records_byte_identical() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conversations.json");
    let store = JsonFileStore::new(&path);

    store.append_turn(&User::new(10, "Ana").with_phone("555"), turn(1)).unwrap();
    store.append_turn(&User::new(30, "Eva"), turn(2)).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    store.append_turn(&User::new(20, "Ben"), turn(3)).unwrap();
    let after = fs::read_to_string(&path).unwrap();

    // Each existing record's pretty-printed block appears unchanged
    let before_store: Store = serde_json::from_str(&before).unwrap();
    for id in [10, 30] {
        let block = serde_json::to_string_pretty(&before_store[&id]).unwrap();
        let indented = block.replace('\n', "\n  ");
        assert!(before.contains(&indented));
        assert!(after.contains(&indented), "record {id} changed");
    }
    assert_eq!(store.load().unwrap().len(), 3);
}

#[test]
fn existing_deployed_file_is_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conversations.json");
    fs::write(
        &path,
        r#"{
  "12345": {
    "user_id": 12345,
    "first_name": "TestUser",
    "phone_number": "123456789",
    "conversations": [
      {
        "user_message": "Hola bot",
        "bot_response": "Hola",
        "arrival_time": "2024-01-01T00:00:00-05:00",
        "response_time": "2024-01-01T00:00:02-05:00"
      }
    ]
  }
}"#,
    )
    .unwrap();

    let store = JsonFileStore::new(&path);
    store.append_turn(&User::new(12345, "TestUser"), turn(1)).unwrap();

    let record = &store.load().unwrap()[&12345];
    assert_eq!(record.phone_number, "123456789");
    assert_eq!(record.turns.len(), 2);
}

#[test]
fn invalid_content_fails_without_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conversations.json");
    fs::write(&path, "[1, 2, 3]").unwrap();

    let store = JsonFileStore::new(&path);
    let err = store.append_turn(&User::new(1, "Ana"), turn(0)).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
    let err = store.record_contact(&User::new(1, "Ana"), "123").unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));

    assert_eq!(fs::read_to_string(&path).unwrap(), "[1, 2, 3]");
}

#[test]
fn contact_then_text_keeps_phone() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("conversations.json"));
    let user = User::new(12345, "TestUser");

    store.record_contact(&user, "123456789").unwrap();
    store.append_turn(&user, turn(1)).unwrap();
    store.record_contact(&user, "").unwrap();

    assert_eq!(store.load().unwrap()[&12345].phone_number, "123456789");
}
