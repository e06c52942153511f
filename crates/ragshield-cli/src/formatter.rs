//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use ragshield_core::{BackendCapability, CompiledFilter, FilterOutcome};
use ragshield_proto::{MetadataField, NativeFilter};
use serde_json::{json, Value};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format the registered backends.
    fn format_backends(&self, backends: &[&BackendCapability]) -> String;

    /// Format a compiled filter.
    fn format_compiled(&self, compiled: &CompiledFilter) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn outcome_name(outcome: &FilterOutcome) -> &'static str {
    match outcome {
        FilterOutcome::Unrestricted => "unrestricted",
        FilterOutcome::DenyAll => "deny_all",
        FilterOutcome::Restrict(_) => "restrict",
    }
}

fn limit_or_dash(limit: Option<usize>) -> String {
    limit.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_backends(&self, backends: &[&BackendCapability]) -> String {
        if backends.is_empty() {
            return "No backends registered".to_string();
        }

        let mut table = Table::new();
        let mut header = vec!["Backend".to_string(), "Operators".to_string()];
        header.extend(MetadataField::ALL.iter().map(|f| format!("{} key", f)));
        header.extend(["Max depth", "Max IN", "Min operands"].map(String::from));
        table.set_header(header);

        for capability in backends {
            let mut row = vec![
                Cell::new(capability.backend),
                Cell::new(capability.operators_display()),
            ];
            for field in MetadataField::ALL {
                row.push(Cell::new(capability.field_name(field).unwrap_or("-")));
            }
            row.push(Cell::new(limit_or_dash(capability.limits.max_depth)));
            row.push(Cell::new(limit_or_dash(capability.limits.max_in_values)));
            row.push(Cell::new(capability.limits.min_logical_operands));
            table.add_row(row);
        }

        table.to_string()
    }

    fn format_compiled(&self, compiled: &CompiledFilter) -> String {
        let filter = match &compiled.outcome {
            FilterOutcome::Restrict(NativeFilter::Json(value)) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            FilterOutcome::Restrict(NativeFilter::Expression(expr)) => expr.clone(),
            _ => "-".to_string(),
        };

        let mut table = Table::new();
        table.set_header(vec!["Property", "Value"]);
        table.add_row(vec![Cell::new("Backend"), Cell::new(compiled.backend)]);
        table.add_row(vec![
            Cell::new("Outcome"),
            Cell::new(outcome_name(&compiled.outcome)),
        ]);
        table.add_row(vec![Cell::new("Constraint"), Cell::new(&compiled.constraint)]);
        table.add_row(vec![Cell::new("Native filter"), Cell::new(filter)]);
        for warning in &compiled.warnings {
            table.add_row(vec![Cell::new("Warning"), Cell::new(warning)]);
        }

        table.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl JsonFormatter {
    fn backend_to_json(capability: &BackendCapability) -> Value {
        let fields: serde_json::Map<String, Value> = capability
            .fields
            .iter()
            .map(|(field, name)| (field.to_string(), Value::String(name.clone())))
            .collect();
        json!({
            "backend": capability.backend.as_str(),
            "operators": capability.operators.iter().map(|o| o.to_string()).collect::<Vec<_>>(),
            "fields": fields,
            "limits": {
                "max_depth": capability.limits.max_depth,
                "max_in_values": capability.limits.max_in_values,
                "min_logical_operands": capability.limits.min_logical_operands,
            },
        })
    }
}

impl Formatter for JsonFormatter {
    fn format_backends(&self, backends: &[&BackendCapability]) -> String {
        let rows: Vec<Value> = backends.iter().map(|c| Self::backend_to_json(c)).collect();
        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_compiled(&self, compiled: &CompiledFilter) -> String {
        let filter = match &compiled.outcome {
            FilterOutcome::Restrict(NativeFilter::Json(value)) => value.clone(),
            FilterOutcome::Restrict(NativeFilter::Expression(expr)) => Value::String(expr.clone()),
            _ => Value::Null,
        };
        let output = json!({
            "backend": compiled.backend.as_str(),
            "outcome": outcome_name(&compiled.outcome),
            "constraint": compiled.constraint.to_string(),
            "filter": filter,
            "warnings": compiled.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
        });
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_error(&self, error: &str) -> String {
        json!({ "error": error }).to_string()
    }
}
