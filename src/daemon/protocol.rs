use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{error::PluginError, notification::NotifyId};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    CreateNotificationChannel,
    ScheduleNotification,
    ShowNotification,
    CancelNotification,
    CancelAllNotifications,
    RequestPermissions,
    InitializeNotifications,
    SetBadgeCount,
    GetNotificationState,
    Subscribe,
    Ping,
}

impl Method {
    const ALL: [Method; 11] = [
        Method::CreateNotificationChannel,
        Method::ScheduleNotification,
        Method::ShowNotification,
        Method::CancelNotification,
        Method::CancelAllNotifications,
        Method::RequestPermissions,
        Method::InitializeNotifications,
        Method::SetBadgeCount,
        Method::GetNotificationState,
        Method::Subscribe,
        Method::Ping,
    ];

    /// Wire name, as the mobile method channel spells it.
    pub fn name(&self) -> &'static str {
        match self {
            Method::CreateNotificationChannel => "createNotificationChannel",
            Method::ScheduleNotification => "scheduleNotification",
            Method::ShowNotification => "showNotification",
            Method::CancelNotification => "cancelNotification",
            Method::CancelAllNotifications => "cancelAllNotifications",
            Method::RequestPermissions => "requestPermissions",
            Method::InitializeNotifications => "initializeNotifications",
            Method::SetBadgeCount => "setBadgeCount",
            Method::GetNotificationState => "getNotificationState",
            Method::Subscribe => "subscribe",
            Method::Ping => "ping",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// Named call arguments. Absent keys and `Null` values are both "missing".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Arguments(BTreeMap<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn with_opt<T: Into<Value>>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| **v != Value::Null)
    }

    pub fn int(&self, key: &str) -> Result<Option<i64>, PluginError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(mismatch(key, "int", other)),
        }
    }

    pub fn boolean(&self, key: &str) -> Result<Option<bool>, PluginError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(v)) => Ok(Some(*v)),
            Some(other) => Err(mismatch(key, "bool", other)),
        }
    }

    pub fn string(&self, key: &str) -> Result<Option<String>, PluginError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Str(v)) => Ok(Some(v.clone())),
            Some(other) => Err(mismatch(key, "string", other)),
        }
    }
}

fn mismatch(key: &str, expected: &str, found: &Value) -> PluginError {
    PluginError::InvalidArguments(format!(
        "{key} must be {expected}, got {}",
        found.kind()
    ))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub method: String,
    pub arguments: Arguments,
}

impl Message {
    pub fn new(method: Method, arguments: Arguments) -> Self {
        Self {
            method: method.name().to_string(),
            arguments,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Success(Value),
    Error { code: String, message: String },
    NotImplemented,
}

impl Response {
    pub fn success(value: impl Into<Value>) -> Self {
        Response::Success(value.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }
}

impl From<PluginError> for Response {
    fn from(error: PluginError) -> Self {
        match error {
            PluginError::NotImplemented(_) => Response::NotImplemented,
            other => Response::Error {
                code: other.code().to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Pushed from the daemon to subscribed clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NotificationTapped { notify_id: NotifyId },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::NotificationTapped { .. } => "notificationTapped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip() {
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.name()), Some(method));
        }
        assert_eq!(Method::from_name("setAlarmVolume"), None);
    }

    #[test]
    fn null_counts_as_missing() {
        let args = Arguments::new().with("title", Value::Null).with("notifyId", 4);
        assert_eq!(args.string("title"), Ok(None));
        assert_eq!(args.int("notifyId"), Ok(Some(4)));
        assert_eq!(args.boolean("autoCancel"), Ok(None));
    }

    #[test]
    fn wrong_type_is_invalid_arguments() {
        let args = Arguments::new().with("notifyId", "42");
        let err = args.int("notifyId").unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGS");
        assert!(err.to_string().contains("notifyId must be int"));
    }

    #[test]
    fn errors_map_to_responses() {
        assert_eq!(
            Response::from(PluginError::NotImplemented("x".into())),
            Response::NotImplemented
        );
        let Response::Error { code, .. } =
            Response::from(PluginError::InvalidArguments("bad".into()))
        else {
            panic!("expected an error response");
        };
        assert_eq!(code, "INVALID_ARGS");
    }
}
