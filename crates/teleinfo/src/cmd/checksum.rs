use serde::Serialize;
use teleinfo_frame::checksum;

use crate::cmd::ChecksumArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct ChecksumOutput<'a> {
    name: &'a str,
    value: &'a str,
    checksum: String,
    line: String,
}

pub fn run(args: ChecksumArgs, format: OutputFormat) -> CliResult<i32> {
    let sum = char::from(checksum(args.name.as_bytes(), args.value.as_bytes()));

    match format {
        OutputFormat::Json => {
            let out = ChecksumOutput {
                name: &args.name,
                value: &args.value,
                checksum: sum.to_string(),
                line: format!("{} {} {sum}", args.name, args.value),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => println!("{sum}"),
    }

    Ok(SUCCESS)
}
