use crate::db::KeyValueStore;
use crate::errors::AppResult;
use crate::models::{
    ConversationRecord, InteractionRecord, OrderRecord, OrderStatus, SupportStatus, INTERACTION_KEY_PREFIX,
};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

/// Interactions parsed from the store plus the keys that had to be skipped.
#[derive(Debug, Default)]
pub struct InteractionLoad {
    pub records: Vec<InteractionRecord>,
    pub skipped: Vec<String>,
}

pub fn interaction_pattern() -> String {
    format!("{}*", INTERACTION_KEY_PREFIX)
}

/// Reads every `interaction:*` value. A key that cannot be read or decoded is
/// skipped; only a failure to list keys is returned as an error.
pub fn load_interactions(store: &dyn KeyValueStore) -> AppResult<InteractionLoad> {
    let mut keys = store.keys(&interaction_pattern())?;
    keys.sort();

    let mut load = InteractionLoad::default();
    for key in keys {
        let raw = match store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "skipping unreadable interaction");
                load.skipped.push(key);
                continue;
            }
        };
        match serde_json::from_str::<InteractionRecord>(&raw) {
            Ok(record) => load.records.push(record),
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "skipping malformed interaction");
                load.skipped.push(key);
            }
        }
    }
    load.records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    Ok(load)
}

/// Stores the demo interactions when the namespace is empty. Returns how many
/// records were written.
pub fn seed_demo_interactions(store: &dyn KeyValueStore) -> AppResult<usize> {
    if !store.keys(&interaction_pattern())?.is_empty() {
        return Ok(0);
    }
    let records = demo_interactions();
    for record in &records {
        store.set(&record.storage_key(), &serde_json::to_string(record)?)?;
    }
    tracing::info!(count = records.len(), "seeded demo interactions");
    Ok(records.len())
}

fn at(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap_or_default()
}

fn day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap_or_default()
}

fn interaction(id: &str, customer: &str, channel: &str, timestamp: &str, status: SupportStatus) -> InteractionRecord {
    InteractionRecord {
        id: id.to_string(),
        customer: customer.to_string(),
        channel: channel.to_string(),
        timestamp: at(timestamp),
        status,
    }
}

pub fn demo_interactions() -> Vec<InteractionRecord> {
    use SupportStatus::{Pending, Resolved};
    vec![
        interaction("i1001", "João Silva", "email", "2023-06-01 09:30:00", Resolved),
        interaction("i1002", "Maria Oliveira", "chat", "2023-06-02 14:00:00", Pending),
        interaction("i1003", "Pedro Santos", "phone", "2023-06-03 11:15:00", Resolved),
        interaction("i1004", "Ana Costa", "email", "2023-06-04 16:45:00", Pending),
        interaction("i1005", "Carlos Ferreira", "chat", "2023-06-05 10:30:00", Resolved),
    ]
}

fn order(id: &str, customer: &str, cents: i64, date: &str, status: OrderStatus) -> OrderRecord {
    OrderRecord {
        id: id.to_string(),
        customer: customer.to_string(),
        value: Decimal::new(cents, 2),
        date: day(date),
        status,
    }
}

/// Simulated store orders; a real deployment would page these from the shop API.
pub fn demo_orders() -> Vec<OrderRecord> {
    use OrderStatus::{Delivered, Processing, Shipped};
    vec![
        order("1001", "João Silva", 15_000, "2023-06-01", Delivered),
        order("1002", "Maria Oliveira", 20_000, "2023-06-02", Processing),
        order("1003", "Pedro Santos", 150_000, "2023-06-03", Shipped),
        order("1004", "Ana Costa", 50_000, "2023-06-04", Delivered),
        order("1005", "Carlos Ferreira", 25_435, "2023-06-05", Processing),
        order("1006", "Fernanda Lima", 32_548, "2023-06-06", Shipped),
    ]
}

fn conversation(
    id: &str,
    customer: &str,
    timestamp: &str,
    message_count: u32,
    status: SupportStatus,
) -> ConversationRecord {
    ConversationRecord {
        id: id.to_string(),
        customer: customer.to_string(),
        timestamp: at(timestamp),
        message_count,
        status,
    }
}

pub fn demo_conversations() -> Vec<ConversationRecord> {
    use SupportStatus::{Pending, Resolved};
    vec![
        conversation("w1001", "João Silva", "2023-06-01 10:15:00", 5, Resolved),
        conversation("w1002", "Maria Oliveira", "2023-06-02 14:30:00", 3, Pending),
        conversation("w1003", "Pedro Santos", "2023-06-03 09:45:00", 8, Resolved),
        conversation("w1004", "Ana Costa", "2023-06-04 16:20:00", 2, Pending),
        conversation("w1005", "Carlos Ferreira", "2023-06-05 11:10:00", 6, Resolved),
    ]
}
