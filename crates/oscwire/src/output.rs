use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use oscwire_codec::{OscArg, OscMessage};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

#[derive(Serialize)]
struct MessageOutput<'a> {
    address: &'a str,
    tags: &'a str,
    args: Vec<OscArg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decode_error: Option<String>,
    size: usize,
    peer: &'a str,
    timestamp: String,
}

pub fn print_message(msg: &OscMessage, peer: &str, format: OutputFormat) {
    let (args, decode_error) = match msg.arguments() {
        Ok(args) => (args, None),
        Err(err) => (Vec::new(), Some(err.to_string())),
    };

    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                address: msg.address(),
                tags: msg.tags(),
                args,
                decode_error,
                size: msg.size(),
                peer,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "TAGS", "ARGS", "SIZE", "PEER"])
                .add_row(vec![
                    msg.address().to_string(),
                    msg.tags().to_string(),
                    args_preview(&args, decode_error.as_deref()),
                    msg.size().to_string(),
                    peer.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} ,{} [{}] peer={}",
                msg.address(),
                msg.tags(),
                args_preview(&args, decode_error.as_deref()),
                peer
            );
        }
        OutputFormat::Raw => {
            print_raw(&msg.write_to_buffer());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn args_preview(args: &[OscArg], decode_error: Option<&str>) -> String {
    if let Some(err) = decode_error {
        return format!("<undecodable: {err}>");
    }
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_joins_arguments() {
        let args = vec![OscArg::Int(1), OscArg::Str("a".into()), OscArg::Nil];
        assert_eq!(args_preview(&args, None), "1, \"a\", nil");
        assert_eq!(args_preview(&[], Some("boom")), "<undecodable: boom>");
    }

    #[test]
    fn json_output_lists_typed_args() {
        let mut msg = OscMessage::with_address("/fader/1");
        msg.write_f32(0.5).unwrap();
        let out = MessageOutput {
            address: msg.address(),
            tags: msg.tags(),
            args: msg.arguments().unwrap(),
            decode_error: None,
            size: msg.size(),
            peer: "test",
            timestamp: "0".to_string(),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["address"], "/fader/1");
        assert_eq!(json["tags"], "f");
        assert_eq!(json["args"][0]["type"], "float");
        assert_eq!(json["size"], 20);
        assert!(json.get("decode_error").is_none());
    }
}
