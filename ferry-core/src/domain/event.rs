//! Audit events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Append-only record of something that happened to an import or machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportEvent {
    pub id: i64,
    pub event_type: EventType,
    pub code_import_id: Option<i64>,
    pub machine: Option<String>,
    pub message: Option<String>,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Create,
    Request,
    Start,
    Finish,
    Reclaim,
    Online,
    Offline,
    Quiesce,
}

/// Event waiting to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub code_import_id: Option<i64>,
    pub machine: Option<String>,
    pub message: Option<String>,
}

impl NewEvent {
    pub fn for_import(event_type: EventType, code_import_id: i64) -> Self {
        Self {
            event_type,
            code_import_id: Some(code_import_id),
            machine: None,
            message: None,
        }
    }

    pub fn for_machine(event_type: EventType, hostname: &str) -> Self {
        Self {
            event_type,
            code_import_id: None,
            machine: Some(hostname.to_string()),
            message: None,
        }
    }

    pub fn on_machine(mut self, hostname: &str) -> Self {
        self.machine = Some(hostname.to_string());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Create => "CREATE",
            EventType::Request => "REQUEST",
            EventType::Start => "START",
            EventType::Finish => "FINISH",
            EventType::Reclaim => "RECLAIM",
            EventType::Online => "ONLINE",
            EventType::Offline => "OFFLINE",
            EventType::Quiesce => "QUIESCE",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(EventType::Create),
            "REQUEST" => Ok(EventType::Request),
            "START" => Ok(EventType::Start),
            "FINISH" => Ok(EventType::Finish),
            "RECLAIM" => Ok(EventType::Reclaim),
            "ONLINE" => Ok(EventType::Online),
            "OFFLINE" => Ok(EventType::Offline),
            "QUIESCE" => Ok(EventType::Quiesce),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
