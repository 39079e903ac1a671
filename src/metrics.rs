use crate::models::{
    ConversationFilter, ConversationMetrics, ConversationRecord, CustomerSummary, DailyRevenue, InteractionRecord,
    OrderFilter, OrderMetrics, OrderRecord, OverviewMetrics, StatusCount, StatusRevenue,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

pub const TOP_CUSTOMERS: usize = 10;

pub fn total_revenue(orders: &[OrderRecord]) -> Decimal {
    orders.iter().map(|order| order.value).sum()
}

pub fn average_order_value(orders: &[OrderRecord]) -> Decimal {
    if orders.is_empty() {
        return Decimal::ZERO;
    }
    total_revenue(orders) / Decimal::from(orders.len())
}

/// Percentage of resolved items, 0 for an empty set.
pub fn resolution_rate<'a, I>(statuses: I) -> f64
where
    I: IntoIterator<Item = &'a crate::models::SupportStatus>,
{
    let (resolved, total) = statuses
        .into_iter()
        .fold((0usize, 0usize), |(resolved, total), status| {
            (resolved + usize::from(status.is_resolved()), total + 1)
        });
    if total == 0 {
        return 0.0;
    }
    resolved as f64 / total as f64 * 100.0
}

pub fn conversation_resolution_rate(conversations: &[ConversationRecord]) -> f64 {
    resolution_rate(conversations.iter().map(|conversation| &conversation.status))
}

pub fn interaction_resolution_rate(interactions: &[InteractionRecord]) -> f64 {
    resolution_rate(interactions.iter().map(|interaction| &interaction.status))
}

pub fn total_messages(conversations: &[ConversationRecord]) -> u64 {
    conversations
        .iter()
        .map(|conversation| u64::from(conversation.message_count))
        .sum()
}

pub fn overview(
    orders: &[OrderRecord],
    conversations: &[ConversationRecord],
    interactions: &[InteractionRecord],
) -> OverviewMetrics {
    OverviewMetrics {
        order_count: orders.len(),
        total_revenue: total_revenue(orders),
        conversation_count: conversations.len(),
        conversation_resolution_rate: conversation_resolution_rate(conversations),
        interaction_count: interactions.len(),
        interaction_resolution_rate: interaction_resolution_rate(interactions),
    }
}

pub fn order_metrics(orders: &[OrderRecord]) -> OrderMetrics {
    OrderMetrics {
        order_count: orders.len(),
        total_revenue: total_revenue(orders),
        average_order_value: average_order_value(orders),
    }
}

pub fn conversation_metrics(conversations: &[ConversationRecord]) -> ConversationMetrics {
    ConversationMetrics {
        conversation_count: conversations.len(),
        message_count: total_messages(conversations),
        resolution_rate: conversation_resolution_rate(conversations),
    }
}

pub fn daily_revenue(orders: &[OrderRecord]) -> Vec<DailyRevenue> {
    let mut by_day: BTreeMap<NaiveDate, (Decimal, usize)> = BTreeMap::new();
    for order in orders {
        let entry = by_day.entry(order.date).or_insert((Decimal::ZERO, 0));
        entry.0 += order.value;
        entry.1 += 1;
    }
    by_day
        .into_iter()
        .map(|(date, (revenue, order_count))| DailyRevenue {
            date,
            revenue,
            order_count,
        })
        .collect()
}

/// Counts per label, largest first; equal counts keep first-seen order.
pub fn status_counts<'a, I>(labels: I) -> Vec<StatusCount>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<StatusCount> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|entry| entry.status == label) {
            Some(entry) => entry.count += 1,
            None => counts.push(StatusCount {
                status: label.to_string(),
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn conversation_status_counts(conversations: &[ConversationRecord]) -> Vec<StatusCount> {
    status_counts(conversations.iter().map(|conversation| conversation.status.as_str()))
}

pub fn interaction_channel_counts(interactions: &[InteractionRecord]) -> Vec<StatusCount> {
    status_counts(interactions.iter().map(|interaction| interaction.channel.as_str()))
}

/// Order count and revenue per order status, in first-seen status order.
pub fn revenue_by_status(orders: &[OrderRecord]) -> Vec<StatusRevenue> {
    let mut rows: Vec<StatusRevenue> = Vec::new();
    for order in orders {
        let label = order.status.as_str();
        match rows.iter_mut().find(|row| row.status == label) {
            Some(row) => {
                row.order_count += 1;
                row.revenue += order.value;
            }
            None => rows.push(StatusRevenue {
                status: label.to_string(),
                order_count: 1,
                revenue: order.value,
            }),
        }
    }
    rows
}

/// Outer join of orders and conversations on the exact customer name.
pub fn customer_summaries(orders: &[OrderRecord], conversations: &[ConversationRecord]) -> Vec<CustomerSummary> {
    let mut order_index: Vec<&str> = Vec::new();
    let names = orders
        .iter()
        .map(|order| order.customer.as_str())
        .chain(conversations.iter().map(|conversation| conversation.customer.as_str()));
    for name in names {
        if !order_index.contains(&name) {
            order_index.push(name);
        }
    }

    let mut order_totals: HashMap<&str, (usize, Decimal)> = HashMap::new();
    for order in orders {
        let entry = order_totals.entry(order.customer.as_str()).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += order.value;
    }

    let mut conversation_totals: HashMap<&str, (usize, u64)> = HashMap::new();
    for conversation in conversations {
        let entry = conversation_totals
            .entry(conversation.customer.as_str())
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u64::from(conversation.message_count);
    }

    order_index
        .into_iter()
        .map(|customer| {
            let (order_count, total_spent) = order_totals.get(customer).copied().unwrap_or((0, Decimal::ZERO));
            let (conversation_count, message_count) = conversation_totals.get(customer).copied().unwrap_or((0, 0));
            let average_order_value = if order_count == 0 {
                Decimal::ZERO
            } else {
                total_spent / Decimal::from(order_count)
            };
            CustomerSummary {
                customer: customer.to_string(),
                order_count,
                total_spent,
                average_order_value,
                conversation_count,
                message_count,
            }
        })
        .collect()
}

pub fn top_by_spent(customers: &[CustomerSummary], limit: usize) -> Vec<CustomerSummary> {
    let mut ranked = customers.to_vec();
    ranked.sort_by(|a, b| b.total_spent.cmp(&a.total_spent));
    ranked.truncate(limit);
    ranked
}

pub fn top_by_order_count(customers: &[CustomerSummary], limit: usize) -> Vec<CustomerSummary> {
    let mut ranked = customers.to_vec();
    ranked.sort_by(|a, b| b.order_count.cmp(&a.order_count));
    ranked.truncate(limit);
    ranked
}

fn within(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.map_or(true, |from| date >= from) && to.map_or(true, |to| date <= to)
}

pub fn filter_orders(orders: &[OrderRecord], filter: &OrderFilter) -> Vec<OrderRecord> {
    orders
        .iter()
        .filter(|order| within(order.date, filter.from, filter.to))
        .filter(|order| filter.statuses.is_empty() || filter.statuses.contains(&order.status))
        .cloned()
        .collect()
}

pub fn filter_conversations(conversations: &[ConversationRecord], filter: &ConversationFilter) -> Vec<ConversationRecord> {
    conversations
        .iter()
        .filter(|conversation| within(conversation.timestamp.date(), filter.from, filter.to))
        .filter(|conversation| filter.statuses.is_empty() || filter.statuses.contains(&conversation.status))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, SupportStatus};
    use crate::sources::{demo_conversations, demo_orders};
    use chrono::NaiveDateTime;
    use rust_decimal_macros::dec;

    fn order(customer: &str, value: Decimal, date: &str, status: OrderStatus) -> OrderRecord {
        OrderRecord {
            id: format!("{}-{}", customer, date),
            customer: customer.to_string(),
            value,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date"),
            status,
        }
    }

    fn conversation(customer: &str, messages: u32, status: SupportStatus) -> ConversationRecord {
        ConversationRecord {
            id: format!("w-{}", customer),
            customer: customer.to_string(),
            timestamp: NaiveDateTime::parse_from_str("2023-06-01 10:00:00", "%Y-%m-%d %H:%M:%S").expect("ts"),
            message_count: messages,
            status,
        }
    }

    #[test]
    fn revenue_and_average_for_two_orders() {
        let orders = vec![
            order("A", dec!(150.00), "2023-06-01", OrderStatus::Delivered),
            order("B", dec!(200.00), "2023-06-02", OrderStatus::Processing),
        ];
        assert_eq!(total_revenue(&orders), dec!(350.00));
        assert_eq!(average_order_value(&orders), dec!(175.00));
    }

    #[test]
    fn empty_tables_aggregate_to_zero() {
        assert_eq!(total_revenue(&[]), Decimal::ZERO);
        assert_eq!(average_order_value(&[]), Decimal::ZERO);
        assert_eq!(conversation_resolution_rate(&[]), 0.0);
        assert!(daily_revenue(&[]).is_empty());
        assert!(customer_summaries(&[], &[]).is_empty());
        let metrics = overview(&[], &[], &[]);
        assert_eq!(metrics.order_count, 0);
        assert_eq!(metrics.interaction_resolution_rate, 0.0);
    }

    #[test]
    fn resolution_rate_is_sixty_percent_for_three_of_five() {
        let conversations = vec![
            conversation("A", 1, SupportStatus::Resolved),
            conversation("B", 1, SupportStatus::Resolved),
            conversation("C", 1, SupportStatus::Resolved),
            conversation("D", 1, SupportStatus::Pending),
            conversation("E", 1, SupportStatus::Pending),
        ];
        assert!((conversation_resolution_rate(&conversations) - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn demo_data_totals_match_expected_values() {
        let orders = demo_orders();
        assert_eq!(total_revenue(&orders), dec!(2929.83));
        let conversations = demo_conversations();
        assert_eq!(total_messages(&conversations), 24);
        let counts = conversation_status_counts(&conversations);
        assert_eq!(counts[0].status, "Resolved");
        assert_eq!(counts[0].count, 3);
        assert_eq!(counts[1].count, 2);
    }

    #[test]
    fn daily_revenue_groups_same_day_orders() {
        let orders = vec![
            order("A", dec!(10), "2023-06-02", OrderStatus::Delivered),
            order("B", dec!(5.5), "2023-06-01", OrderStatus::Delivered),
            order("C", dec!(4.5), "2023-06-02", OrderStatus::Shipped),
        ];
        let daily = daily_revenue(&orders);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].revenue, dec!(5.5));
        assert_eq!(daily[1].revenue, dec!(14.5));
        assert_eq!(daily[1].order_count, 2);
    }

    #[test]
    fn customer_join_is_outer_and_first_seen_ordered() {
        let orders = vec![
            order("Ana", dec!(100), "2023-06-01", OrderStatus::Delivered),
            order("Bruno", dec!(50), "2023-06-01", OrderStatus::Delivered),
            order("Ana", dec!(20), "2023-06-02", OrderStatus::Shipped),
        ];
        let conversations = vec![
            conversation("Carla", 4, SupportStatus::Pending),
            conversation("Ana", 3, SupportStatus::Resolved),
        ];
        let customers = customer_summaries(&orders, &conversations);
        let names: Vec<_> = customers.iter().map(|row| row.customer.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Bruno", "Carla"]);

        assert_eq!(customers[0].order_count, 2);
        assert_eq!(customers[0].total_spent, dec!(120));
        assert_eq!(customers[0].average_order_value, dec!(60));
        assert_eq!(customers[0].message_count, 3);
        assert_eq!(customers[2].order_count, 0);
        assert_eq!(customers[2].average_order_value, Decimal::ZERO);
        assert_eq!(customers[2].conversation_count, 1);
    }

    #[test]
    fn top_rankings_are_stable_on_ties() {
        let orders = vec![
            order("A", dec!(10), "2023-06-01", OrderStatus::Delivered),
            order("B", dec!(30), "2023-06-01", OrderStatus::Delivered),
            order("C", dec!(10), "2023-06-01", OrderStatus::Delivered),
        ];
        let customers = customer_summaries(&orders, &[]);
        let spent: Vec<_> = top_by_spent(&customers, 2).into_iter().map(|row| row.customer).collect();
        assert_eq!(spent, vec!["B", "A"]);
        let counts: Vec<_> = top_by_order_count(&customers, 10).into_iter().map(|row| row.customer).collect();
        assert_eq!(counts, vec!["A", "B", "C"]);
    }

    #[test]
    fn filters_apply_inclusive_dates_and_status_set() {
        let orders = demo_orders();
        let filter = OrderFilter {
            from: NaiveDate::from_ymd_opt(2023, 6, 2),
            to: NaiveDate::from_ymd_opt(2023, 6, 5),
            statuses: vec![OrderStatus::Processing],
        };
        let filtered = filter_orders(&orders, &filter);
        let ids: Vec<_> = filtered.iter().map(|order| order.id.as_str()).collect();
        assert_eq!(ids, vec!["1002", "1005"]);

        let conversations = demo_conversations();
        let filter = ConversationFilter {
            from: NaiveDate::from_ymd_opt(2023, 6, 3),
            to: None,
            statuses: Vec::new(),
        };
        assert_eq!(filter_conversations(&conversations, &filter).len(), 3);
    }

    #[test]
    fn revenue_by_status_keeps_first_seen_order() {
        let rows = revenue_by_status(&demo_orders());
        let labels: Vec<_> = rows.iter().map(|row| row.status.as_str()).collect();
        assert_eq!(labels, vec!["Delivered", "Processing", "Shipped"]);
        assert_eq!(rows[2].revenue, dec!(1825.48));
    }
}
