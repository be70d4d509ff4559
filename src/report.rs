use std::path::Path;

use log::{debug, info};
use serde_json::Value;

use crate::error::{Result, TestStatsError};

/// One normalized test record, ready for ingestion.
///
/// Field order follows document order, which keeps uploaded documents stable
/// across runs of the same report.
pub type Record = serde_json::Map<String, Value>;

/// Converts one test report XML file into a list of records.
///
/// Every element matching `tag` (at any depth) yields one record, enriched
/// with the workflow id, the run attempt, and the job id recovered from the
/// report path.
///
/// `report` must be relative to `base_dir`: the job id lives in the first
/// path segment, and the file itself is read from `base_dir.join(report)`.
pub fn parse_xml_report(
    tag: &str,
    base_dir: &Path,
    report: &Path,
    workflow_id: u64,
    workflow_run_attempt: u64,
) -> Result<Vec<Record>> {
    info!("Parsing {tag}s for test report: {}", report.display());

    let job_id = job_id_from_report_path(report)?;
    debug!("Found job id: {job_id}");

    let contents = std::fs::read_to_string(base_dir.join(report))?;
    let document = roxmltree::Document::parse(&contents)?;

    let mut records = Vec::new();
    for element in document
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == tag)
    {
        let mut record = process_xml_element(element);
        record.insert("workflow_id".into(), Value::from(workflow_id));
        record.insert(
            "workflow_run_attempt".into(),
            Value::from(workflow_run_attempt),
        );
        record.insert("job_id".into(), Value::from(job_id));
        records.push(record);
    }

    Ok(records)
}

/// Recovers the job id from a report path.
///
/// CI workflows append the job id to the extracted artifact directory name,
/// so a report path looks like:
///
///     unzipped-test-reports-foo_5596745227/test/test-reports/TEST-foo.xml
///
/// and the job id is the text after the last underscore of the first
/// segment.
fn job_id_from_report_path(report: &Path) -> Result<i64> {
    let first_segment = report
        .iter()
        .next()
        .and_then(|segment| segment.to_str())
        .ok_or_else(|| TestStatsError::JobId(report.display().to_string()))?;

    first_segment
        .rsplit('_')
        .next()
        .unwrap_or(first_segment)
        .parse()
        .map_err(|_| TestStatsError::JobId(report.display().to_string()))
}

/// Converts one XML element into a record.
fn process_xml_element(element: roxmltree::Node<'_, '_>) -> Record {
    let mut record = Record::new();

    // Attributes become top-level fields. The XML format encodes all values
    // as strings; coerce each one to an int or float where possible so the
    // analytics store can aggregate them.
    for attribute in element.attributes() {
        record.insert(attribute.name().to_owned(), coerce(attribute.value()));
    }

    // Inner and trailing text become `text` and `tail` fields; whitespace-only
    // text is omitted entirely.
    if let Some(text) = element.text().filter(|text| !text.trim().is_empty()) {
        record.insert("text".into(), Value::from(text));
    }
    if let Some(tail) = tail_text(element).filter(|tail| !tail.trim().is_empty()) {
        record.insert("tail".into(), Value::from(tail));
    }

    // Child elements are stored under their tag name. Repeated sibling tags
    // collapse to the last one.
    for child in element.children().filter(roxmltree::Node::is_element) {
        record.insert(
            child.tag_name().name().to_owned(),
            Value::Object(process_xml_element(child)),
        );
    }

    record
}

/// Returns the text immediately following `element`, up to the next sibling
/// element.
fn tail_text<'a>(element: roxmltree::Node<'a, '_>) -> Option<&'a str> {
    element
        .next_sibling()
        .filter(roxmltree::Node::is_text)
        .and_then(|node| node.text())
}

/// Coerces an attribute value: integer if it parses as one, else float, else
/// the original string. Each attribute is coerced independently.
fn coerce(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        // Non-finite floats have no JSON representation; keep the string.
        if let Some(number) = serde_json::Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    Value::from(raw)
}
