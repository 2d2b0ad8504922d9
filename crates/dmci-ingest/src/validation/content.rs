//! Domain checks on the information content of an MMD document

use super::report::{CheckResult, ValidationReport};
use super::vocabulary::{Vocabularies, VocabularyLookup};
use crate::xml::Element;

/// Schemes accepted in `resource` URLs
pub const ALLOWED_URL_SCHEMES: [&str; 4] = ["http", "https", "ftp", "sftp"];

/// `keywords/@vocabulary` value marking CF standard names
pub const CF_KEYWORDS_VOCABULARY: &str = "Climate and Forecast Standard Names";

const RECTANGLE_DIRECTIONS: [&str; 4] = ["north", "south", "west", "east"];

/// Runs the content checks against a parsed document
///
/// Each check runs independently; absent elements skip their check.
#[derive(Debug)]
pub struct ContentValidator {
    vocabularies: Vocabularies,
}

impl ContentValidator {
    pub fn new(vocabularies: Vocabularies) -> Self {
        Self { vocabularies }
    }

    pub fn check(&self, root: &Element) -> ValidationReport {
        let mut report = ValidationReport::new();

        for resource in root.descendants_named("resource") {
            report.push(check_url(resource.text(), false));
        }

        let rectangles = root.find_all("geographic_extent/rectangle");
        if !rectangles.is_empty() {
            report.push(check_rectangle(&rectangles));
        }

        if let Some(result) = self.check_cf(root) {
            report.push(result);
        }

        if let Some(result) = self.check_vocabulary(root) {
            report.push(result);
        }

        report
    }

    /// At most one CF keyword block holding a single known standard name
    pub fn check_cf(&self, root: &Element) -> Option<CheckResult> {
        let blocks: Vec<&Element> = root
            .children_named("keywords")
            .filter(|e| e.attr("vocabulary") == Some(CF_KEYWORDS_VOCABULARY))
            .collect();

        let mut errors = Vec::new();
        match blocks.as_slice() {
            [] => return None,
            [block] => {
                let names: Vec<&str> = block.children.iter().map(Element::text).collect();
                if names.len() > 1 {
                    errors.push(format!(
                        "Only one CF name should be provided, got {}.",
                        names.len()
                    ));
                }
                for name in names {
                    match self.vocabularies.cf_standard_names.contains(name) {
                        Ok(true) => {},
                        Ok(false) => {
                            errors.push(format!("Keyword '{}' is not a CF standard name.", name))
                        },
                        Err(e) => {
                            tracing::error!(error = %e, "CF standard name lookup failed");
                            errors.push("Internal Error: CF standard name lookup failed.".to_string());
                        },
                    }
                }
            },
            _ => errors.push("More than one CF entry found. Only one is allowed.".to_string()),
        }

        Some(CheckResult::new(
            "Climate and Forecast Standard Names Check",
            errors,
        ))
    }

    /// access_constraint, activity_type, operational_status and use_constraint/identifier
    pub fn check_vocabulary(&self, root: &Element) -> Option<CheckResult> {
        let fields: [(&str, &str, &dyn VocabularyLookup); 4] = [
            (
                "access_constraint",
                "access_constraint",
                self.vocabularies.access_constraint.as_ref(),
            ),
            (
                "activity_type",
                "activity_type",
                self.vocabularies.activity_type.as_ref(),
            ),
            (
                "operational_status",
                "operational_status",
                self.vocabularies.operational_status.as_ref(),
            ),
            (
                "use_constraint",
                "use_constraint/identifier",
                self.vocabularies.use_constraint.as_ref(),
            ),
        ];

        let mut checked = 0;
        let mut errors = Vec::new();
        for (field, path, vocabulary) in fields {
            for element in root.find_all(path) {
                checked += 1;
                match vocabulary.contains(element.text()) {
                    Ok(true) => {},
                    Ok(false) => errors.push(format!(
                        "Incorrect vocabulary '{}' for element '{}'.",
                        element.text(),
                        field
                    )),
                    Err(e) => {
                        tracing::error!(field, error = %e, "Vocabulary lookup failed");
                        errors.push(format!("Internal Error: '{}' vocabulary lookup failed.", field));
                    },
                }
            }
        }

        (checked > 0).then(|| CheckResult::new("Controlled Vocabularies Check", errors))
    }
}

/// Check a resource URL
///
/// ASCII only, scheme in [`ALLOWED_URL_SCHEMES`], a host containing a dot and
/// a path of at least `/` unless `allow_no_path` is set.
pub fn check_url(raw: &str, allow_no_path: bool) -> CheckResult {
    let mut errors = Vec::new();

    if !raw.is_ascii() {
        errors.push("URL contains non-ASCII characters.".to_string());
    }

    match url::Url::parse(raw) {
        Ok(parsed) => {
            if !ALLOWED_URL_SCHEMES.contains(&parsed.scheme()) {
                errors.push(format!("URL scheme '{}' not allowed.", parsed.scheme()));
            }

            let (authority, path) = split_authority(raw);
            if !authority.contains('.') {
                errors.push(format!("Domain '{}' is not valid.", authority));
            }

            if path.is_empty() && !allow_no_path {
                errors.push("URL contains no path. At least '/' is required.".to_string());
            }
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            errors.push("URL scheme '' not allowed.".to_string());
            errors.push("Domain '' is not valid.".to_string());
        },
        Err(e) => {
            tracing::debug!(url = %raw, error = %e, "URL could not be parsed");
            errors.push("URL cannot be parsed.".to_string());
        },
    }

    CheckResult::new(format!("URL Check on '{}'", raw), errors)
}

/// Authority and path of an absolute URL as written, before normalisation
fn split_authority(raw: &str) -> (&str, &str) {
    let Some((_, rest)) = raw.split_once("://") else {
        return ("", "");
    };
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(end);
    let path_end = tail.find(['?', '#']).unwrap_or(tail.len());
    (authority, &tail[..path_end])
}

/// Check `geographic_extent/rectangle`
///
/// Bounds are only range-checked when exactly one rectangle with four
/// numeric directions was found. East < west is allowed (antimeridian).
pub fn check_rectangle(rectangles: &[&Element]) -> CheckResult {
    let mut errors = Vec::new();
    let mut values: [Option<f64>; 4] = [None; 4];

    if rectangles.len() > 1 {
        errors.push("Multiple rectangle elements in file.".to_string());
    }

    if let Some(rectangle) = rectangles.first() {
        for child in &rectangle.children {
            let slot = RECTANGLE_DIRECTIONS.iter().position(|d| *d == child.name);
            if slot.is_none() {
                errors.push(format!(
                    "The element '{}' is not a valid rectangle element.",
                    child.name
                ));
            }
            match child.text().parse::<f64>() {
                Ok(value) => {
                    if let Some(slot) = slot {
                        values[slot] = Some(value);
                    }
                },
                Err(_) => errors.push(format!(
                    "Value of rectangle element '{}' is not a number.",
                    child.name
                )),
            }
        }
    }

    for (direction, value) in RECTANGLE_DIRECTIONS.iter().zip(values.iter()) {
        if value.is_none() {
            errors.push(format!("Missing rectangle element '{}'.", direction));
        }
    }

    if let (true, [Some(north), Some(south), Some(west), Some(east)]) = (errors.is_empty(), values)
    {
        if !(-180.0..=180.0).contains(&west) {
            errors.push("Longitude West must be less/more than +/- 180 degrees.".to_string());
        }
        if !(-180.0..=180.0).contains(&east) {
            errors.push("Longitude East must be less/more than +/- 180 degrees.".to_string());
        }
        if !(-90.0 <= south && south <= north && north <= 90.0) {
            errors.push("Latitudes not in range -90 <= south <= north <= 90.".to_string());
        }
    }

    CheckResult::new("Rectangle Check", errors)
}
