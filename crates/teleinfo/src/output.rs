use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use teleinfo_frame::Frame;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Serializes a frame as a JSON object in wire order.
struct Fields<'a>(&'a Frame);

impl Serialize for Fields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    source: &'a str,
    timestamp: String,
    fields: Fields<'a>,
}

pub fn print_frame(frame: &Frame, source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", frame_json(frame, source)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "VALUE"]);
            for (name, value) in frame.iter() {
                table.add_row(vec![name, value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", frame_line(frame)),
    }
}

fn frame_json(frame: &Frame, source: &str) -> String {
    let out = FrameOutput {
        source,
        timestamp: now_unix_seconds(),
        fields: Fields(frame),
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

fn frame_line(frame: &Frame) -> String {
    frame
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
