use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::InputError;

pub const MIN_COUNT: u32 = 1;
pub const MAX_COUNT: u32 = 1000;
pub const DEFAULT_COUNT: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schema {
    User,
    Product,
    Order,
}

impl Schema {
    pub fn name(self) -> &'static str {
        match self {
            Schema::User => "user",
            Schema::Product => "product",
            Schema::Order => "order",
        }
    }

    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Schema::User => &["id", "first_name", "last_name", "email", "age", "created_at"],
            Schema::Product => &["id", "name", "category", "price", "stock", "sku"],
            Schema::Order => &["id", "user_id", "product_id", "quantity", "total", "status", "ordered_at"],
        }
    }
}

impl FromStr for Schema {
    type Err = InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "users" => Ok(Schema::User),
            "product" | "products" => Ok(Schema::Product),
            "order" | "orders" => Ok(Schema::Order),
            _ => Err(InputError::Unsupported {
                kind: "schema (expected user, product or order)",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
    Csv,
    Sql,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
            Format::Sql => "sql",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Json => "JSON",
            Format::Csv => "CSV",
            Format::Sql => "SQL",
        })
    }
}

impl FromStr for Format {
    type Err = InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            "sql" => Ok(Format::Sql),
            _ => Err(InputError::Unsupported {
                kind: "format (expected json, csv or sql)",
                value: value.to_string(),
            }),
        }
    }
}

pub fn parse_count(value: &str) -> Result<u32, InputError> {
    let count = value
        .trim()
        .parse::<i64>()
        .map_err(|_| InputError::Unsupported {
            kind: "count",
            value: value.to_string(),
        })?;
    match u32::try_from(count) {
        Ok(count) if (MIN_COUNT..=MAX_COUNT).contains(&count) => Ok(count),
        _ => Err(InputError::CountOutOfRange {
            value: count.clamp(i64::from(u32::MIN), i64::from(u32::MAX)) as u32,
            min: MIN_COUNT,
            max: MAX_COUNT,
        }),
    }
}

/// `test_data_<schema>.<ext>` in the working directory.
pub fn output_path(schema: Schema, format: Format) -> PathBuf {
    PathBuf::from(format!("test_data_{}.{}", schema.name(), format.extension()))
}

pub fn build_prompt(schema: Schema, format: Format, count: u32) -> String {
    let shape = match format {
        Format::Json => "a JSON array of objects".to_string(),
        Format::Csv => "CSV with a header row".to_string(),
        Format::Sql => format!("SQL INSERT statements into a `{}s` table", schema.name()),
    };
    format!(
        "Generate {count} realistic, varied {schema} records as {shape}.\n\
Fields: {fields}.\n\
Keep values internally consistent (unique ids, valid emails and dates). \
Reply with a single fenced code block containing only the {format} data.",
        schema = schema.name(),
        fields = schema.fields().join(", "),
    )
}
