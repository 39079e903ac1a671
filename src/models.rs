use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of a support conversation or a logged CRM interaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SupportStatus {
    Resolved,
    Pending,
    Other(String),
}

impl SupportStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Resolved => "Resolved",
            Self::Pending => "Pending",
            Self::Other(value) => value,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved)
    }
}

impl From<String> for SupportStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "resolved" | "resolvido" => Self::Resolved,
            "pending" | "pendente" => Self::Pending,
            _ => Self::Other(value),
        }
    }
}

impl From<SupportStatus> for String {
    fn from(value: SupportStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for SupportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Delivered,
    Processing,
    Shipped,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Delivered => "Delivered",
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::Other(value) => value,
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "delivered" | "entregue" => Self::Delivered,
            "processing" | "processando" => Self::Processing,
            "shipped" | "enviado" => Self::Shipped,
            _ => Self::Other(value),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CRM event as stored under `interaction:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    #[serde(rename = "interaction_id")]
    pub id: String,
    pub customer: String,
    #[serde(rename = "type")]
    pub channel: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub status: SupportStatus,
}

impl InteractionRecord {
    pub fn storage_key(&self) -> String {
        format!("{}{}", INTERACTION_KEY_PREFIX, self.id)
    }
}

pub const INTERACTION_KEY_PREFIX: &str = "interaction:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(rename = "order_id")]
    pub id: String,
    pub customer: String,
    pub value: Decimal,
    pub date: NaiveDate,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(rename = "conversation_id")]
    pub id: String,
    pub customer: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub message_count: u32,
    pub status: SupportStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSummary {
    pub customer: String,
    pub order_count: usize,
    pub total_spent: Decimal,
    pub average_order_value: Decimal,
    pub conversation_count: usize,
    pub message_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub order_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRevenue {
    pub status: String,
    pub order_count: usize,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub statuses: Vec<OrderStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub statuses: Vec<SupportStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Message shown alongside a rendered view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewMetrics {
    pub order_count: usize,
    pub total_revenue: Decimal,
    pub conversation_count: usize,
    pub conversation_resolution_rate: f64,
    pub interaction_count: usize,
    pub interaction_resolution_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderMetrics {
    pub order_count: usize,
    pub total_revenue: Decimal,
    pub average_order_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMetrics {
    pub conversation_count: usize,
    pub message_count: u64,
    pub resolution_rate: f64,
}

/// Accepts the timestamp shapes the CRM writers produce and always writes
/// `YYYY-MM-DD HH:MM:SS`.
pub mod timestamp_format {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    const OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(value);
            }
        }
        if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
            return Some(value.naive_utc());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(OUTPUT_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unsupported timestamp `{}`", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portuguese_status_labels_map_to_variants() {
        assert_eq!(SupportStatus::from("Resolvido".to_string()), SupportStatus::Resolved);
        assert_eq!(SupportStatus::from("pending".to_string()), SupportStatus::Pending);
        assert_eq!(OrderStatus::from("Enviado".to_string()), OrderStatus::Shipped);
        assert_eq!(
            OrderStatus::from("Cancelado".to_string()),
            OrderStatus::Other("Cancelado".to_string())
        );
    }

    #[test]
    fn interaction_json_uses_crm_field_names() {
        let raw = r#"{"interaction_id":"i1","customer":"Ana Costa","type":"email","timestamp":"2023-06-04 16:45:00","status":"Pendente"}"#;
        let record: InteractionRecord = serde_json::from_str(raw).expect("parse interaction");
        assert_eq!(record.id, "i1");
        assert_eq!(record.channel, "email");
        assert_eq!(record.status, SupportStatus::Pending);
        assert_eq!(record.storage_key(), "interaction:i1");

        let encoded = serde_json::to_value(&record).expect("encode");
        assert_eq!(encoded["type"], "email");
        assert_eq!(encoded["timestamp"], "2023-06-04 16:45:00");
        assert_eq!(encoded["status"], "Pending");
    }

    #[test]
    fn timestamps_accept_iso_and_date_only_forms() {
        assert!(timestamp_format::parse("2023-06-01T10:15:00").is_some());
        assert!(timestamp_format::parse("2023-06-01T10:15:00Z").is_some());
        assert!(timestamp_format::parse("2023-06-01").is_some());
        assert!(timestamp_format::parse("yesterday").is_none());
    }
}
