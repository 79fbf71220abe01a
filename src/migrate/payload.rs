use serde_json::{Map, Value};
use thiserror::Error;

/// Key of the nested object that carries the notification body.
pub const MESSAGE_KEY: &str = "message";
/// Key injected into the nested object with the notification identity.
pub const ID_KEY: &str = "id";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("message is not valid JSON")]
    Parse(#[source] serde_json::Error),
    #[error("message is a JSON {found}, expected an object")]
    NotAnObject { found: &'static str },
    #[error("message has no \"message\" field")]
    MissingMessage,
    #[error("\"message\" field is a JSON {found}, expected an object")]
    MessageNotAnObject { found: &'static str },
    #[error("failed to serialize the outgoing message")]
    Serialize(#[source] serde_json::Error),
}

/// Builds the outgoing payload for a notification.
///
/// The incoming payload must be a JSON object whose `"message"` member is also
/// an object. The result is the incoming payload with `message.id` set to
/// `notification_id`; every other member, and the member order, is preserved.
pub fn rewrite_outgoing(incoming: &str, notification_id: &str) -> Result<String, PayloadError> {
    let mut root: Value = serde_json::from_str(incoming).map_err(PayloadError::Parse)?;
    inject_id(&mut root, notification_id)?;
    serde_json::to_string(&root).map_err(PayloadError::Serialize)
}

fn inject_id(root: &mut Value, notification_id: &str) -> Result<(), PayloadError> {
    let found = kind_of(root);
    let object = root
        .as_object_mut()
        .ok_or(PayloadError::NotAnObject { found })?;
    let message = message_object(object)?;
    if let Some(previous) = message.insert(ID_KEY.to_string(), notification_id.into()) {
        tracing::debug!(
            target: "notifications_migrator",
            event = "message_id_replaced",
            previous = %previous,
            id = notification_id
        );
    }
    Ok(())
}

fn message_object(
    object: &mut Map<String, Value>,
) -> Result<&mut Map<String, Value>, PayloadError> {
    let nested = object
        .get_mut(MESSAGE_KEY)
        .ok_or(PayloadError::MissingMessage)?;
    let found = kind_of(nested);
    nested
        .as_object_mut()
        .ok_or(PayloadError::MessageNotAnObject { found })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
