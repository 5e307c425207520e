use serde_json::{json, Value};

use crate::domain::chat::Identity;

/// Chat document body with named participants and no avatars.
pub fn chat_data(participants: &[&str], updated_at: i64) -> Value {
    let info: Vec<Value> = participants
        .iter()
        .map(|id| json!({"id": id, "name": format!("user-{id}")}))
        .collect();

    json!({
        "participants": participants,
        "participantsInfo": info,
        "lastMessage": "",
        "updatedAt": updated_at,
    })
}

pub fn identity(user_id: &str, image: Option<&str>) -> Identity {
    let identity = Identity::new(user_id, format!("user-{user_id}"));
    match image {
        Some(image) => identity.with_image(image),
        None => identity,
    }
}
