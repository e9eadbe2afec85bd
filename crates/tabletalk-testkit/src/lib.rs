// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use serde_json::{Value, json};
use std::collections::VecDeque;
use tabletalk_app::{Record, ResultSet, Scalar, SchemaColumn, SchemaTable};
use tabletalk_session::{Channel, ChannelSignal};

const DEMO_CUSTOMERS: [(i64, &str, &str, i64); 6] = [
    (1, "Amy Shaw", "Springfield", 14),
    (2, "Bob Tran", "Portland", 3),
    (3, "Carla Mendez", "Springfield", 22),
    (4, "Dev Patel", "Austin", 9),
    (5, "Erin Walsh", "Portland", 1),
    (6, "Frank Osei", "Denver", 17),
];

/// The canned dataset demo replies carry, as app-level records.
pub fn demo_result_set() -> ResultSet {
    ResultSet::new(
        DEMO_CUSTOMERS
            .iter()
            .map(|(id, name, city, total_orders)| {
                Record::from_fields(vec![
                    ("id".to_owned(), Scalar::Number(*id as f64)),
                    ("name".to_owned(), Scalar::Text((*name).to_owned())),
                    ("city".to_owned(), Scalar::Text((*city).to_owned())),
                    (
                        "total_orders".to_owned(),
                        Scalar::Number(*total_orders as f64),
                    ),
                ])
            })
            .collect(),
    )
}

pub fn demo_schema_tables() -> Vec<SchemaTable> {
    fn table(name: &str, columns: &[(&str, &str)]) -> SchemaTable {
        SchemaTable {
            name: name.to_owned(),
            columns: columns
                .iter()
                .map(|(name, data_type)| SchemaColumn {
                    name: (*name).to_owned(),
                    data_type: (*data_type).to_owned(),
                })
                .collect(),
        }
    }

    vec![
        table(
            "customers",
            &[
                ("id", "INTEGER"),
                ("name", "TEXT"),
                ("city", "TEXT"),
                ("total_orders", "INTEGER"),
            ],
        ),
        table(
            "orders",
            &[
                ("id", "INTEGER"),
                ("customer_id", "INTEGER"),
                ("placed_at", "TEXT"),
                ("total_cents", "INTEGER"),
            ],
        ),
        table(
            "products",
            &[("id", "INTEGER"), ("sku", "TEXT"), ("price_cents", "INTEGER")],
        ),
    ]
}

fn demo_result_rows() -> Value {
    Value::Array(
        DEMO_CUSTOMERS
            .iter()
            .map(|(id, name, city, total_orders)| {
                json!({
                    "id": id,
                    "name": name,
                    "city": city,
                    "total_orders": total_orders,
                })
            })
            .collect(),
    )
}

fn demo_schema_frame(selected: &[String]) -> String {
    let tables: Vec<Value> = demo_schema_tables()
        .iter()
        .map(|table| {
            json!({
                "table_name": table.name,
                "columns": table
                    .columns
                    .iter()
                    .map(|column| json!({
                        "name": column.name,
                        "data_type": column.data_type,
                    }))
                    .collect::<Vec<Value>>(),
            })
        })
        .collect();

    json!({
        "db_schema_context": {
            "schema_data": tables,
            "tables": selected,
        }
    })
    .to_string()
}

/// A canned stand-in for the server: every outbound command is answered from
/// the demo corpus on the next poll. Used by `tabletalk --demo` and by tests
/// that need a full round trip without a server.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    pending: VecDeque<ChannelSignal>,
    sent: Vec<String>,
    selected: Vec<String>,
}

impl ScriptedChannel {
    pub fn connected() -> Self {
        let mut channel = Self::default();
        channel.pending.push_back(ChannelSignal::Connected);
        channel
    }

    /// Queue an arbitrary signal, for tests that script the peer directly.
    pub fn push(&mut self, signal: ChannelSignal) {
        self.pending.push_back(signal);
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    fn answer(&mut self, frame: &str) {
        let Ok(command) = serde_json::from_str::<Value>(frame) else {
            return;
        };

        if let Some(question) = command.get("user_input").and_then(Value::as_str) {
            let reply = json!({
                "reply": format!(
                    "Generated SQL: SELECT * FROM customers -- for {question:?}"
                ),
                "db_result": demo_result_rows(),
            });
            self.pending.push_back(ChannelSignal::Frame(reply.to_string()));
        } else if command.get("get_schema_context").is_some() {
            let frame = demo_schema_frame(&self.selected);
            self.pending.push_back(ChannelSignal::Frame(frame));
        } else if let Some(tables) = command.get("schema_context_update") {
            self.selected = serde_json::from_value(tables.clone()).unwrap_or_default();
            let echo = json!({ "schema_context_updated": self.selected });
            self.pending.push_back(ChannelSignal::Frame(echo.to_string()));
        }
    }
}

impl Channel for ScriptedChannel {
    fn send(&mut self, frame: &str) -> Result<()> {
        self.sent.push(frame.to_owned());
        self.answer(frame);
        Ok(())
    }

    fn poll(&mut self) -> ChannelSignal {
        self.pending.pop_front().unwrap_or(ChannelSignal::Idle)
    }
}
