//! Output rendering: table, JSON, plain.

use std::io::{self, Write};

use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Render `data` in the chosen format. `id_fn` supplies the plain-mode line.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::Plain => data.iter().map(id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Print rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
