//! Plain-text rendering of the dashboard views.

use crate::dashboard::{ConversationsView, CrewView, CustomersView, OrdersView, OverviewView, SettingsView};
use crate::format::{currency_br, percent};
use crate::models::{CustomerSummary, Notice, NoticeLevel, StatusCount};
use crate::pipeline::{CrewDefinition, StageStatus};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt::Write;

const BAR_WIDTH: usize = 40;

fn width(text: &str) -> usize {
    text.chars().count()
}

fn pad(text: &str, to: usize) -> String {
    let mut padded = text.to_string();
    padded.extend(std::iter::repeat(' ').take(to.saturating_sub(width(text))));
    padded
}

/// Left-aligned columns separated by two spaces, with a dashed rule under the header.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| width(header)).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if index < widths.len() {
                widths[index] = widths[index].max(width(cell));
            }
        }
    }

    let render_row = |cells: Vec<&str>| -> String {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| pad(cell, *width))
            .collect::<Vec<_>>()
            .join("  ");
        line.trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&render_row(headers.to_vec()));
    out.push('\n');
    out.push_str(&widths.iter().map(|width| "-".repeat(*width)).collect::<Vec<_>>().join("  "));
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

/// Horizontal bars scaled to the largest value. Labels carry the formatted value.
pub fn bar_chart(bars: &[(String, f64, String)]) -> String {
    let label_width = bars.iter().map(|(label, _, _)| width(label)).max().unwrap_or(0);
    let max = bars.iter().map(|(_, value, _)| *value).fold(0.0_f64, f64::max);

    let mut out = String::new();
    for (label, value, shown) in bars {
        let length = if max > 0.0 {
            ((value / max) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let _ = writeln!(out, "{}  {} {}", pad(label, label_width), "#".repeat(length), shown);
    }
    out
}

fn heading(out: &mut String, title: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "{}\n{}", title, "=".repeat(width(title)));
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{}\n{}", title, "-".repeat(width(title)));
}

fn notices(out: &mut String, notices: &[Notice]) {
    for notice in notices {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        let _ = writeln!(out, "[{}] {}", tag, notice.message);
    }
}

fn metric_lines(out: &mut String, metrics: &[(&str, String)]) {
    let label_width = metrics.iter().map(|(label, _)| width(label)).max().unwrap_or(0);
    for (label, value) in metrics {
        let _ = writeln!(out, "{}  {}", pad(&format!("{}:", label), label_width + 1), value);
    }
}

fn money_bar(label: String, value: Decimal) -> (String, f64, String) {
    (label, value.to_f64().unwrap_or(0.0), currency_br(value))
}

fn count_bars(counts: &[StatusCount]) -> Vec<(String, f64, String)> {
    counts
        .iter()
        .map(|entry| (entry.status.clone(), entry.count as f64, entry.count.to_string()))
        .collect()
}

pub fn overview(view: &OverviewView) -> String {
    let mut out = String::new();
    notices(&mut out, &view.notices);
    heading(&mut out, "Overview");
    metric_lines(
        &mut out,
        &[
            ("Orders", view.metrics.order_count.to_string()),
            ("Total revenue", currency_br(view.metrics.total_revenue)),
            ("Conversations", view.metrics.conversation_count.to_string()),
            ("Resolution rate", percent(view.metrics.conversation_resolution_rate)),
            ("CRM interactions", view.metrics.interaction_count.to_string()),
        ],
    );

    section(&mut out, "Daily sales");
    let bars: Vec<_> = view
        .daily_revenue
        .iter()
        .map(|day| money_bar(day.date.format("%Y-%m-%d").to_string(), day.revenue))
        .collect();
    out.push_str(&bar_chart(&bars));

    section(&mut out, "Conversation status");
    out.push_str(&bar_chart(&count_bars(&view.conversation_statuses)));
    out
}

pub fn orders(view: &OrdersView) -> String {
    let mut out = String::new();
    notices(&mut out, &view.notices);
    heading(&mut out, "Orders");
    metric_lines(
        &mut out,
        &[
            ("Orders", view.metrics.order_count.to_string()),
            ("Total revenue", currency_br(view.metrics.total_revenue)),
            ("Average order value", currency_br(view.metrics.average_order_value)),
        ],
    );

    section(&mut out, "Sales by status");
    let bars: Vec<_> = view
        .revenue_by_status
        .iter()
        .map(|row| money_bar(row.status.clone(), row.revenue))
        .collect();
    out.push_str(&bar_chart(&bars));

    section(&mut out, "Order list");
    let rows: Vec<Vec<String>> = view
        .orders
        .iter()
        .map(|order| {
            vec![
                order.id.clone(),
                order.customer.clone(),
                currency_br(order.value),
                order.date.format("%Y-%m-%d").to_string(),
                order.status.to_string(),
            ]
        })
        .collect();
    out.push_str(&table(&["Order", "Customer", "Value", "Date", "Status"], &rows));
    out
}

fn customer_rows(customers: &[CustomerSummary]) -> Vec<Vec<String>> {
    customers
        .iter()
        .map(|row| {
            vec![
                row.customer.clone(),
                row.order_count.to_string(),
                currency_br(row.total_spent),
                currency_br(row.average_order_value),
                row.conversation_count.to_string(),
                row.message_count.to_string(),
            ]
        })
        .collect()
}

pub fn customers(view: &CustomersView) -> String {
    let mut out = String::new();
    notices(&mut out, &view.notices);
    heading(&mut out, "Customers");
    out.push_str(&table(
        &["Customer", "Orders", "Total spent", "Average order", "Conversations", "Messages"],
        &customer_rows(&view.customers),
    ));

    section(&mut out, "Top customers by spend");
    let bars: Vec<_> = view
        .top_by_spent
        .iter()
        .map(|row| money_bar(row.customer.clone(), row.total_spent))
        .collect();
    out.push_str(&bar_chart(&bars));

    section(&mut out, "Top customers by orders");
    let bars: Vec<_> = view
        .top_by_order_count
        .iter()
        .map(|row| (row.customer.clone(), row.order_count as f64, row.order_count.to_string()))
        .collect();
    out.push_str(&bar_chart(&bars));
    out
}

pub fn conversations(view: &ConversationsView) -> String {
    let mut out = String::new();
    notices(&mut out, &view.notices);
    heading(&mut out, "Conversations");
    metric_lines(
        &mut out,
        &[
            ("Conversations", view.metrics.conversation_count.to_string()),
            ("Messages", view.metrics.message_count.to_string()),
            ("Resolution rate", percent(view.metrics.resolution_rate)),
        ],
    );

    section(&mut out, "Status distribution");
    out.push_str(&bar_chart(&count_bars(&view.statuses)));

    section(&mut out, "Conversation list");
    let rows: Vec<Vec<String>> = view
        .conversations
        .iter()
        .map(|conversation| {
            vec![
                conversation.id.clone(),
                conversation.customer.clone(),
                conversation.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                conversation.message_count.to_string(),
                conversation.status.to_string(),
            ]
        })
        .collect();
    out.push_str(&table(&["Conversation", "Customer", "Started", "Messages", "Status"], &rows));

    section(&mut out, "CRM interactions");
    let rows: Vec<Vec<String>> = view
        .interactions
        .iter()
        .map(|interaction| {
            vec![
                interaction.id.clone(),
                interaction.customer.clone(),
                interaction.channel.clone(),
                interaction.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                interaction.status.to_string(),
            ]
        })
        .collect();
    out.push_str(&table(&["Interaction", "Customer", "Channel", "Timestamp", "Status"], &rows));
    if !view.interaction_channels.is_empty() {
        out.push('\n');
        out.push_str(&bar_chart(&count_bars(&view.interaction_channels)));
    }
    out
}

pub fn settings(view: &SettingsView) -> String {
    let mut out = String::new();
    notices(&mut out, &view.notices);
    heading(&mut out, "Settings");
    for group in &view.groups {
        section(&mut out, &format!("{} ({})", group.group.title(), group.status));
        let rows: Vec<Vec<String>> = group
            .rows
            .iter()
            .map(|row| vec![row.label.to_string(), row.key.to_string(), row.value.clone()])
            .collect();
        out.push_str(&table(&["Field", "Key", "Value"], &rows));
    }
    out
}

pub fn crew_run(view: &CrewView) -> String {
    let mut out = String::new();
    notices(&mut out, &view.notices);
    let title = match &view.run.replayed_from {
        Some(task) => format!("Crew replay {} from {}", view.run.run_id, task),
        None => format!("Crew run {}", view.run.run_id),
    };
    heading(&mut out, &title);
    let rows: Vec<Vec<String>> = view
        .run
        .stages
        .iter()
        .map(|stage| {
            let status = match stage.status {
                StageStatus::Completed => "completed",
                StageStatus::Skipped => "skipped",
                StageStatus::Failed => "failed",
            };
            let detail = stage.output.clone().or_else(|| stage.note.clone()).unwrap_or_default();
            vec![stage.task.clone(), stage.agent.clone(), status.to_string(), detail]
        })
        .collect();
    out.push_str(&table(&["Task", "Agent", "Status", "Detail"], &rows));
    out
}

pub fn crew_definition(definition: &CrewDefinition) -> String {
    let mut out = String::new();
    heading(&mut out, "Crew");
    let rows: Vec<Vec<String>> = definition
        .agents
        .iter()
        .map(|agent| vec![agent.name.clone(), agent.role.clone()])
        .collect();
    out.push_str(&table(&["Agent", "Role"], &rows));

    section(&mut out, "Tasks");
    let rows: Vec<Vec<String>> = definition
        .tasks
        .iter()
        .enumerate()
        .map(|(index, task)| {
            vec![
                (index + 1).to_string(),
                task.name.clone(),
                task.agent.clone(),
                task.context.join(", "),
            ]
        })
        .collect();
    out.push_str(&table(&["#", "Task", "Agent", "Consumes"], &rows));
    out
}
