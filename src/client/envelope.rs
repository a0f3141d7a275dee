//! Decoding of backend response bodies.
//!
//! Some endpoints answer HTTP 200 with `{"success": false, "message": ...}`,
//! so a 2xx status alone does not mean success. The envelope fields are read
//! from the raw JSON value before it is decoded into the caller's type.

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

/// A token pair found in a successful body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug)]
pub enum Envelope<T> {
    Success {
        value: T,
        tokens: Option<IssuedTokens>,
    },
    Failure {
        status: StatusCode,
        message: Option<String>,
    },
}

/// First non-empty string among `keys`. Each key is checked on its own, so a
/// malformed or duplicated neighbour never hides the others.
fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn success_flag(value: &Value) -> Option<bool> {
    ["success", "Success"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_bool))
}

fn message_of(value: &Value) -> Option<String> {
    string_field(value, &["message", "Message", "error"])
}

/// Decodes a non-empty 2xx body.
pub fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<Envelope<T>, serde_json::Error> {
    let value: Value = serde_json::from_slice(body)?;

    if success_flag(&value) == Some(false) {
        return Ok(Envelope::Failure {
            status,
            message: message_of(&value),
        });
    }

    let tokens = string_field(&value, &["token", "Token"]).map(|token| IssuedTokens {
        token,
        refresh_token: string_field(&value, &["refreshToken", "RefreshToken"]),
    });

    Ok(Envelope::Success {
        value: T::deserialize(value)?,
        tokens,
    })
}

/// `message` of an error body, if the body is a JSON object that has one.
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    message_of(&value)
}

pub fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Song {
        title: String,
    }

    #[test]
    fn test_success_false_is_a_failure_even_on_200() {
        let env = decode::<Value>(StatusCode::OK, br#"{"success":false,"message":"X"}"#).unwrap();
        match env {
            Envelope::Failure { status, message } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(message.as_deref(), Some("X"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_objects_and_arrays_decode() {
        let env = decode::<Song>(StatusCode::OK, br#"{"title":"Intro"}"#).unwrap();
        assert!(matches!(env, Envelope::Success { value, tokens: None } if value.title == "Intro"));

        let env = decode::<Vec<Song>>(StatusCode::OK, br#"[{"title":"A"},{"title":"B"}]"#).unwrap();
        assert!(matches!(env, Envelope::Success { value, .. } if value.len() == 2));
    }

    #[test]
    fn test_token_fields_are_picked_up() {
        let env = decode::<Value>(StatusCode::OK, br#"{"Token":"abc","RefreshToken":"def"}"#).unwrap();
        let Envelope::Success { tokens, .. } = env else {
            panic!("expected success");
        };
        assert_eq!(
            tokens,
            Some(IssuedTokens {
                token: "abc".into(),
                refresh_token: Some("def".into()),
            })
        );
    }

    #[test]
    fn test_failure_survives_odd_message_fields() {
        let env = decode::<Value>(StatusCode::OK, br#"{"success":false,"message":"X","error":"detail"}"#).unwrap();
        assert!(matches!(env, Envelope::Failure { message: Some(ref m), .. } if m == "X"));

        let env = decode::<Value>(StatusCode::OK, br#"{"success":false,"message":["X","Y"]}"#).unwrap();
        assert!(matches!(env, Envelope::Failure { message: None, .. }));

        let env = decode::<Value>(StatusCode::OK, br#"{"success":false,"message":{"a":1},"error":"e"}"#).unwrap();
        assert!(matches!(env, Envelope::Failure { message: Some(ref m), .. } if m == "e"));
    }

    #[test]
    fn test_non_string_token_is_ignored() {
        let env = decode::<Value>(StatusCode::OK, br#"{"token":42,"Token":"abc"}"#).unwrap();
        let Envelope::Success { tokens, .. } = env else {
            panic!("expected success");
        };
        assert_eq!(tokens.map(|t| t.token).as_deref(), Some("abc"));
    }

    #[test]
    fn test_error_message_aliases() {
        assert_eq!(error_message(br#"{"message":"m"}"#).as_deref(), Some("m"));
        assert_eq!(error_message(br#"{"Message":"M"}"#).as_deref(), Some("M"));
        assert_eq!(error_message(br#"{"error":"e"}"#).as_deref(), Some("e"));
        assert_eq!(error_message(b"<html>oops</html>"), None);
        assert_eq!(error_message(br#"{"message":""}"#), None);
    }
}
