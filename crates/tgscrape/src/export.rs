//! Export stored messages as JSON or CSV.
//!
//! Every message is written in `(target_id, message_id)` order together with
//! its target's handle. JSON output is a pretty-printed array of objects;
//! CSV output has a header row and RFC 4180 quoting.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Output format for `tgscrape export`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

const CSV_COLUMNS: [&str; 14] = [
    "target_id",
    "target_username",
    "message_id",
    "date_utc",
    "sender_id",
    "sender_username",
    "text",
    "entities_json",
    "views",
    "forwards",
    "reply_to_msg_id",
    "media_type",
    "media_metadata_json",
    "scraped_at",
];

#[derive(Serialize)]
struct ExportMessage {
    target_id: i64,
    target_username: Option<String>,
    message_id: i64,
    date_utc: String,
    sender_id: Option<i64>,
    sender_username: Option<String>,
    text: Option<String>,
    entities_json: String,
    views: Option<i64>,
    forwards: Option<i64>,
    reply_to_msg_id: Option<i64>,
    media_type: Option<String>,
    media_metadata_json: Option<String>,
    scraped_at: String,
}

impl ExportMessage {
    fn csv_fields(&self) -> [String; 14] {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(|v| v.to_string()).unwrap_or_default()
        }
        [
            self.target_id.to_string(),
            opt(&self.target_username),
            self.message_id.to_string(),
            self.date_utc.clone(),
            opt(&self.sender_id),
            opt(&self.sender_username),
            opt(&self.text),
            self.entities_json.clone(),
            opt(&self.views),
            opt(&self.forwards),
            opt(&self.reply_to_msg_id),
            opt(&self.media_type),
            opt(&self.media_metadata_json),
            self.scraped_at.clone(),
        ]
    }
}

/// Export all messages.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(
    config: &Config,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let rows = sqlx::query(
        r#"
        SELECT m.target_id, t.target_username, m.message_id, m.date_utc, m.sender_id,
               m.sender_username, m.text, m.entities_json, m.views, m.forwards,
               m.reply_to_msg_id, m.media_type, m.media_metadata_json, m.scraped_at
        FROM messages m
        LEFT JOIN targets t ON t.target_id = m.target_id
        ORDER BY m.target_id, m.message_id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let messages: Vec<ExportMessage> = rows
        .iter()
        .map(|row| ExportMessage {
            target_id: row.get("target_id"),
            target_username: row.get("target_username"),
            message_id: row.get("message_id"),
            date_utc: row.get("date_utc"),
            sender_id: row.get("sender_id"),
            sender_username: row.get("sender_username"),
            text: row.get("text"),
            entities_json: row.get("entities_json"),
            views: row.get("views"),
            forwards: row.get("forwards"),
            reply_to_msg_id: row.get("reply_to_msg_id"),
            media_type: row.get("media_type"),
            media_metadata_json: row.get("media_metadata_json"),
            scraped_at: row.get("scraped_at"),
        })
        .collect();

    let rendered = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&messages)?,
        ExportFormat::Csv => render_csv(&messages),
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &rendered)?;
            eprintln!(
                "Exported {} messages to {}",
                messages.len(),
                path.display()
            );
        }
        None => {
            println!("{}", rendered);
        }
    }

    pool.close().await;
    Ok(())
}

fn render_csv(messages: &[ExportMessage]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_COLUMNS.join(","));
    out.push_str("\r\n");
    for message in messages {
        let fields: Vec<String> = message.csv_fields().iter().map(|f| csv_escape(f)).collect();
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

/// Quote a field when it contains a delimiter, quote, or line break.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
