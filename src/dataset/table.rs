//! Labeled examples and their comma-delimited table form.
//!
//! Header: feature columns, then `label,source_file,name,class`. Reading
//! keeps every non-identity column as a feature, including ones the current
//! schema does not know, so projection can drop them later.

use std::fmt::Write as _;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{Result, SpecLensError};
use crate::core::featureset::{FeatureSchema, FeatureVector};
use crate::core::file_utils::{atomic_write, FileReader};
use crate::oracle::Label;

/// Identity columns appended after the features.
pub const IDENTITY_COLUMNS: [&str; 4] = ["label", "source_file", "name", "class"];

/// One dataset row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    /// Feature values
    pub features: FeatureVector,
    /// Oracle label
    pub label: Label,
    /// File name the unit came from
    pub source_file: String,
    /// Unit name
    pub name: String,
    /// Enclosing class
    pub class: Option<String>,
}

/// Schema plus rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Feature columns in order
    pub schema: FeatureSchema,
    /// Rows in build order
    pub examples: Vec<LabeledExample>,
}

impl Dataset {
    /// Empty dataset over `schema`
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            examples: Vec::new(),
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// True when there are no rows
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Rows labelled RISKY
    pub fn risky_count(&self) -> usize {
        self.examples
            .iter()
            .filter(|example| example.label == Label::Risky)
            .count()
    }

    /// Feature matrix projected onto `schema`
    pub fn features(&self, schema: &FeatureSchema) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.examples.len(), schema.len()));
        for (mut row, example) in matrix.outer_iter_mut().zip(&self.examples) {
            for (cell, value) in row.iter_mut().zip(example.features.to_row(schema)) {
                *cell = value;
            }
        }
        matrix
    }

    /// Labels as `0` / `1`
    pub fn labels(&self) -> Array1<u8> {
        self.examples.iter().map(|e| e.label.as_u8()).collect()
    }

    /// Subset of rows by index, same schema
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            schema: self.schema.clone(),
            examples: indices
                .iter()
                .filter_map(|&i| self.examples.get(i).cloned())
                .collect(),
        }
    }

    /// Render as delimited text
    pub fn to_csv_string(&self) -> String {
        let mut out = String::new();
        let header: Vec<&str> = self
            .schema
            .columns()
            .iter()
            .map(String::as_str)
            .chain(IDENTITY_COLUMNS)
            .collect();
        write_record(&mut out, header);

        for example in &self.examples {
            let mut fields: Vec<String> = example
                .features
                .to_row(&self.schema)
                .into_iter()
                .map(format_number)
                .collect();
            fields.push(example.label.as_u8().to_string());
            fields.push(example.source_file.clone());
            fields.push(example.name.clone());
            fields.push(example.class.clone().unwrap_or_default());
            write_record(&mut out, fields.iter().map(String::as_str));
        }
        out
    }

    /// Write atomically to `path`
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        atomic_write(path, self.to_csv_string().as_bytes())?;
        debug!(path = %path.display(), rows = self.len(), "Wrote dataset");
        Ok(())
    }

    /// Parse delimited text
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut records = parse_records(text)?.into_iter();
        let header = records
            .next()
            .ok_or_else(|| SpecLensError::dataset("dataset is empty (no header row)"))?;

        let position = |name: &str| -> Result<usize> {
            header.iter().position(|column| column == name).ok_or_else(|| {
                SpecLensError::dataset(format!("header is missing the '{name}' column"))
            })
        };
        let label_at = position("label")?;
        let file_at = position("source_file")?;
        let name_at = position("name")?;
        let class_at = position("class")?;

        let feature_columns: Vec<(usize, &String)> = header
            .iter()
            .enumerate()
            .filter(|(_, column)| !IDENTITY_COLUMNS.contains(&column.as_str()))
            .collect();
        let schema = FeatureSchema::new(feature_columns.iter().map(|(_, c)| c.as_str()));

        let mut examples = Vec::new();
        for (index, record) in records.enumerate() {
            let row = index + 2;
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            if record.len() != header.len() {
                return Err(SpecLensError::dataset_row(
                    format!("expected {} fields, found {}", header.len(), record.len()),
                    row,
                ));
            }

            let mut features = FeatureVector::new();
            for (at, column) in &feature_columns {
                let value = record[*at].trim().parse::<f64>().map_err(|_| {
                    SpecLensError::dataset_row(
                        format!("column '{column}' is not numeric: '{}'", record[*at]),
                        row,
                    )
                })?;
                features.insert(column.as_str(), value);
            }

            let label = parse_label(&record[label_at])
                .ok_or_else(|| SpecLensError::dataset_row(format!("invalid label '{}'", record[label_at]), row))?;
            let class = Some(record[class_at].clone()).filter(|c| !c.is_empty());

            examples.push(LabeledExample {
                features,
                label,
                source_file: record[file_at].clone(),
                name: record[name_at].clone(),
                class,
            });
        }

        Ok(Self { schema, examples })
    }

    /// Read from `path`
    pub fn read_csv(path: &Path) -> Result<Self> {
        let text = FileReader::read_to_string(path)?;
        Self::from_csv_str(&text).map_err(|err| err.with_context(path.display().to_string()))
    }
}

fn parse_label(field: &str) -> Option<Label> {
    let field = field.trim();
    field
        .parse::<u8>()
        .ok()
        .or_else(|| match field.parse::<f64>() {
            Ok(v) if v == 0.0 => Some(0),
            Ok(v) if v == 1.0 => Some(1),
            _ => None,
        })
        .and_then(Label::from_u8)
}

/// Integral values without a decimal point.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn write_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains(&[',', '"', '\n', '\r'][..]) {
            let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

/// Split text into records, honouring quoted fields.
fn parse_records(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            other => field.push(other),
        }
    }

    if in_quotes {
        return Err(SpecLensError::dataset("unterminated quoted field"));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(name: &str, class: Option<&str>, label: Label, n_params: f64) -> LabeledExample {
        let mut features = FeatureVector::new();
        features.insert("n_params", n_params);
        features.insert("ratio", 0.25);
        LabeledExample {
            features,
            label,
            source_file: "shapes.py".into(),
            name: name.into(),
            class: class.map(str::to_string),
        }
    }

    fn dataset() -> Dataset {
        Dataset {
            schema: FeatureSchema::new(["n_params", "ratio"]),
            examples: vec![
                example("area", Some("Square"), Label::Safe, 1.0),
                example("div", None, Label::Risky, 2.0),
            ],
        }
    }

    #[test]
    fn writes_header_and_integral_numbers() {
        let csv = dataset().to_csv_string();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("n_params,ratio,label,source_file,name,class"));
        assert_eq!(lines.next(), Some("1,0.25,0,shapes.py,area,Square"));
        assert_eq!(lines.next(), Some("2,0.25,1,shapes.py,div,"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn reads_back_what_it_writes() {
        let original = dataset();
        let parsed = Dataset::from_csv_str(&original.to_csv_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn quoting_survives_commas_and_quotes() {
        let mut data = dataset();
        data.examples[0].source_file = "odd, \"name\".py".into();
        let csv = data.to_csv_string();
        assert!(csv.contains("\"odd, \"\"name\"\".py\""));
        let parsed = Dataset::from_csv_str(&csv).unwrap();
        assert_eq!(parsed.examples[0].source_file, "odd, \"name\".py");
    }

    #[test]
    fn unknown_columns_are_kept_as_features() {
        let csv = "n_params,legacy,label,source_file,name,class\n3,9,1,a.py,f,\n";
        let parsed = Dataset::from_csv_str(csv).unwrap();
        assert_eq!(parsed.schema.columns(), ["n_params", "legacy"]);
        assert_eq!(parsed.examples[0].features.get("legacy"), Some(9.0));

        let trained = FeatureSchema::new(["n_params", "n_loc"]);
        let matrix = parsed.features(&trained);
        assert_eq!(matrix.row(0).to_vec(), vec![3.0, 0.0]);
    }

    #[test]
    fn missing_identity_column_is_an_error() {
        let err = Dataset::from_csv_str("n_params,label\n1,0\n").unwrap_err();
        assert!(err.to_string().contains("source_file"));
    }

    #[test]
    fn bad_label_reports_row() {
        let csv = "n_params,label,source_file,name,class\n1,0,a.py,f,\n1,7,a.py,g,\n";
        match Dataset::from_csv_str(csv).unwrap_err() {
            SpecLensError::Dataset { row, .. } => assert_eq!(row, Some(3)),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn matrix_and_labels_align() {
        let data = dataset();
        let matrix = data.features(&data.schema);
        assert_eq!(matrix.shape(), &[2, 2]);
        assert_eq!(data.labels().to_vec(), vec![0, 1]);
        assert_eq!(data.risky_count(), 1);
        assert_eq!(data.select(&[1]).examples[0].name, "div");
    }
}
