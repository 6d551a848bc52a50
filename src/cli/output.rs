// Console output for CLI commands
use colored::*;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::core::receiver::DeliveredMessage;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Parse output format from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Render rows as a table, or as a JSON array
pub fn render_list<T>(data: &[T], format: OutputFormat) -> anyhow::Result<String>
where
    T: Tabled + Serialize,
{
    Ok(match format {
        OutputFormat::Table if data.is_empty() => "No items found".yellow().to_string(),
        OutputFormat::Table => Table::new(data).to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
    })
}

/// Print rows in the specified format
pub fn print_list<T>(data: &[T], format: OutputFormat) -> anyhow::Result<()>
where
    T: Tabled + Serialize,
{
    println!("{}", render_list(data, format)?);
    Ok(())
}

/// Print one received message: ID, decoded data, attributes
pub fn print_delivered(message: &DeliveredMessage) {
    println!("{} {}", "Message received, ID:".bold(), message.message_id);
    println!("  Data: {}", message.data);
    println!("  Attributes: {}", message.attributes);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Tabled, Serialize)]
    struct Row {
        step: String,
        result: String,
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("table"), OutputFormat::Table);
        assert_eq!(OutputFormat::parse("other"), OutputFormat::Table);
    }

    #[test]
    fn test_render_list_json() {
        let rows = vec![Row {
            step: "topic".to_string(),
            result: "created".to_string(),
        }];
        let json = render_list(&rows, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["step"], "topic");
        assert_eq!(value[0]["result"], "created");
    }

    #[test]
    fn test_render_list_table_has_headers() {
        let rows = vec![Row {
            step: "publish".to_string(),
            result: "42".to_string(),
        }];
        let table = render_list(&rows, OutputFormat::Table).unwrap();
        assert!(table.contains("step"));
        assert!(table.contains("publish"));
        assert!(table.contains("42"));
    }
}
