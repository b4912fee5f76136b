//! Output formatting utilities

use advisor_lib::PluginRecord;
use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return Ok(());
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items)?,
    }
    Ok(())
}

/// Print any value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print plugin output records as a JSON array
pub fn print_records(records: &[PluginRecord]) -> Result<()> {
    print_json(records)
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format currency
pub fn format_currency(amount: f64, currency: &str) -> String {
    match currency {
        "USD" => format!("${:.2}", amount),
        "EUR" => format!("€{:.2}", amount),
        "GBP" => format!("£{:.2}", amount),
        _ => format!("{:.2} {}", amount, currency),
    }
}

/// Format a percentage value (already in 0..100)
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Color a `price-change` message by direction
pub fn color_price_change(message: &str) -> String {
    if message.starts_with("Price decreased") {
        message.green().to_string()
    } else if message.starts_with("Price increased") {
        message.red().to_string()
    } else if message.starts_with("Size already optimal") {
        message.blue().to_string()
    } else {
        message.yellow().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.192, "USD"), "$0.19");
        assert_eq!(format_currency(1.5, "EUR"), "€1.50");
        assert_eq!(format_currency(2.0, "CHF"), "2.00 CHF");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(75.0), "75.0%");
        assert_eq!(format_percent(33.333), "33.3%");
    }

    #[test]
    fn test_color_price_change_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(color_price_change("Price decreased by 25%"), "Price decreased by 25%");
        assert_eq!(color_price_change("Size already optimal"), "Size already optimal");
    }
}
