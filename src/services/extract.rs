// src/services/extract.rs

//! Structured extraction of circular records from the feed corpus.
//!
//! The portal markup is loosely structured: each result row carries its
//! document id on a `.download-file` marker and its metadata as label/value
//! span pairs inside the information cell. Field values are recovered with a
//! label-to-value sibling scan over the cell's span nodes.
//!
//! Per-row problems never abort extraction; the offending row is skipped with
//! a diagnostic and parsing continues with the remaining rows.

use chrono::NaiveDate;
use log::warn;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Attachment, Circular};

/// Date format used by the portal for both record dates.
const DATE_FORMAT: &str = "%d/%m/%Y";

/// Label preceding the category value.
const LABEL_CATEGORY: &str = "Categoria";
/// Label preceding the publication date.
const LABEL_PUBLISHED: &str = "Pubblicato il";
/// Label preceding the validity date.
const LABEL_VALID_UNTIL: &str = "Valido fino";

/// A value-bearing node paired with the text that precedes it in document
/// order.
///
/// `context` is the text of the node's preceding sibling, `value` the node's
/// own first text block. The pair is decoupled from any markup library so the
/// label matching below can be tested on synthetic sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSpan {
    pub context: String,
    pub value: String,
}

/// Find the value whose preceding text contains `label`.
///
/// The first matching node in document order wins.
pub fn labeled_value<'a>(spans: &'a [LabeledSpan], label: &str) -> Option<&'a str> {
    spans
        .iter()
        .find(|span| span.context.contains(label))
        .map(|span| span.value.as_str())
}

/// Compiled selectors for the result-row markup shape.
struct RowSelectors {
    row: Selector,
    download: Selector,
    cell: Selector,
    span: Selector,
    link: Selector,
}

impl RowSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            row: parse_selector("tr.row-result")?,
            download: parse_selector(".download-file")?,
            cell: parse_selector("td")?,
            span: parse_selector("span")?,
            link: parse_selector(".link-to-file")?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Extract the ordered sequence of circulars from the assembled corpus.
///
/// Row order follows the corpus. Rows missing a mandatory field yield no
/// record; only a structural problem with the selectors is an error.
pub fn extract_circulars(corpus: &str) -> Result<Vec<Circular>> {
    let selectors = RowSelectors::new()?;
    let document = Html::parse_document(corpus);

    let mut circulars = Vec::new();
    for row in document.select(&selectors.row) {
        if let Some(circular) = parse_row(&row, &selectors) {
            circulars.push(circular);
        }
    }
    Ok(circulars)
}

/// Parse one result row, or skip it with a diagnostic.
fn parse_row(row: &ElementRef, selectors: &RowSelectors) -> Option<Circular> {
    let marker = match row
        .select(&selectors.download)
        .next()
        .and_then(|el| el.value().attr("id_doc"))
    {
        Some(raw) => raw,
        None => {
            warn!("result row without document id marker, skipping");
            return None;
        }
    };

    let id: u64 = match marker.trim().parse() {
        Ok(id) => id,
        Err(_) => {
            warn!("can't parse document id {marker:?}, skipping row");
            return None;
        }
    };

    let Some(cell) = row.select(&selectors.cell).nth(1) else {
        warn!("circular {id} has no information cell, skipping");
        return None;
    };

    let title = cell
        .select(&selectors.span)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    if title.is_empty() {
        warn!("circular {id} has no title, skipping");
        return None;
    }

    let spans = labeled_spans(&cell, &selectors.span);

    let category = match labeled_value(&spans, LABEL_CATEGORY) {
        Some(value) => value.to_string(),
        None => {
            warn!("circular {id} has no category field, skipping");
            return None;
        }
    };
    let published_on = date_field(id, &spans, LABEL_PUBLISHED, "published date")?;
    let valid_until = date_field(id, &spans, LABEL_VALID_UNTIL, "valid until date")?;

    let attachments = parse_attachments(id, &cell, &selectors.link);

    Some(Circular {
        id,
        title,
        category,
        published_on,
        valid_until,
        attachments,
    })
}

/// Pair every span in the cell with the text of its preceding sibling.
fn labeled_spans(cell: &ElementRef, span_selector: &Selector) -> Vec<LabeledSpan> {
    cell.select(span_selector)
        .map(|el| LabeledSpan {
            context: el
                .prev_sibling()
                .and_then(|node| node.value().as_text().map(|text| text.to_string()))
                .unwrap_or_default(),
            value: el.text().next().unwrap_or("").trim().to_string(),
        })
        .collect()
}

/// Resolve a labelled date field, logging the reason when the row must be
/// skipped.
fn date_field(id: u64, spans: &[LabeledSpan], label: &str, field: &str) -> Option<NaiveDate> {
    let Some(raw) = labeled_value(spans, label) else {
        warn!("circular {id} has no '{field}' field, skipping");
        return None;
    };
    match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            warn!("circular {id}: can't parse {field} {raw:?}, skipping");
            None
        }
    }
}

/// Collect the row's attachments. A malformed attachment id skips only that
/// attachment.
fn parse_attachments(id: u64, cell: &ElementRef, link_selector: &Selector) -> Vec<Attachment> {
    let mut attachments = Vec::new();
    for link in cell.select(link_selector) {
        let Some(raw) = link.value().attr("id_doc") else {
            continue;
        };
        match raw.trim().parse::<u64>() {
            Ok(attachment_id) => attachments.push(Attachment {
                id: attachment_id,
                title: link.text().collect::<String>().trim().to_string(),
            }),
            Err(_) => {
                warn!("circular {id}: can't parse attachment id {raw:?}, skipping attachment");
            }
        }
    }
    attachments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(rows: &str) -> String {
        format!("<html><body><table>{rows}</table></body></html>")
    }

    fn sample_row(id: &str, title: &str, published: &str, valid: &str) -> String {
        format!(
            concat!(
                r#"<tr class="row-result">"#,
                r#"<td><div class="download-file" id_doc="{id}"></div></td>"#,
                "<td>",
                "<span>{title}</span>",
                r#"Categoria: <span>Circolari famiglie</span>"#,
                "Pubblicato il: <span>{published}</span>",
                "Valido fino al: <span>{valid}</span>",
                r#"<a class="link-to-file" id_doc="9001">modulo.pdf</a>"#,
                r#"<a class="link-to-file" id_doc="9002">allegato.pdf</a>"#,
                "</td></tr>"
            ),
            id = id,
            title = title,
            published = published,
            valid = valid,
        )
    }

    #[test]
    fn extracts_complete_row() {
        let corpus = wrap(&sample_row("42", "Orario lezioni", "07/09/2024", "30/09/2024"));
        let circulars = extract_circulars(&corpus).unwrap();

        assert_eq!(circulars.len(), 1);
        let circular = &circulars[0];
        assert_eq!(circular.id, 42);
        assert_eq!(circular.title, "Orario lezioni");
        assert_eq!(circular.category, "Circolari famiglie");
        assert_eq!(
            circular.published_on,
            NaiveDate::from_ymd_opt(2024, 9, 7).unwrap()
        );
        assert_eq!(
            circular.valid_until,
            NaiveDate::from_ymd_opt(2024, 9, 30).unwrap()
        );
        assert_eq!(circular.attachments.len(), 2);
        assert_eq!(circular.attachments[0].id, 9001);
        assert_eq!(circular.attachments[0].title, "modulo.pdf");
        assert_eq!(circular.attachments[1].id, 9002);
    }

    #[test]
    fn extraction_is_deterministic() {
        let corpus = wrap(&format!(
            "{}{}",
            sample_row("1", "Prima", "01/02/2024", "28/02/2024"),
            sample_row("2", "Seconda", "02/02/2024", "29/02/2024"),
        ));
        let first = extract_circulars(&corpus).unwrap();
        let second = extract_circulars(&corpus).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn row_without_id_marker_is_skipped() {
        let orphan = r#"<tr class="row-result"><td></td><td><span>No marker</span></td></tr>"#;
        let corpus = wrap(&format!(
            "{orphan}{}",
            sample_row("7", "Valida", "01/03/2024", "31/03/2024")
        ));
        let circulars = extract_circulars(&corpus).unwrap();
        assert_eq!(circulars.len(), 1);
        assert_eq!(circulars[0].id, 7);
    }

    #[test]
    fn row_with_unparsable_id_is_skipped() {
        let corpus = wrap(&sample_row("not-a-number", "Rotta", "01/03/2024", "31/03/2024"));
        assert!(extract_circulars(&corpus).unwrap().is_empty());
    }

    #[test]
    fn row_with_empty_title_is_skipped() {
        let corpus = wrap(&sample_row("11", "", "01/03/2024", "31/03/2024"));
        assert!(extract_circulars(&corpus).unwrap().is_empty());
    }

    #[test]
    fn row_without_category_label_is_skipped() {
        let row = concat!(
            r#"<tr class="row-result">"#,
            r#"<td><div class="download-file" id_doc="5"></div></td>"#,
            "<td><span>Senza categoria</span>",
            "Pubblicato il: <span>01/03/2024</span>",
            "Valido fino al: <span>31/03/2024</span>",
            "</td></tr>"
        );
        assert!(extract_circulars(&wrap(row)).unwrap().is_empty());
    }

    #[test]
    fn malformed_date_skips_row_but_not_others() {
        let corpus = wrap(&format!(
            "{}{}",
            sample_row("1", "Rotta", "31/13/2024", "31/03/2024"),
            sample_row("2", "Valida", "07/09/2024", "30/09/2024"),
        ));
        let circulars = extract_circulars(&corpus).unwrap();
        assert_eq!(circulars.len(), 1);
        assert_eq!(circulars[0].id, 2);
        assert_eq!(
            circulars[0].published_on,
            NaiveDate::from_ymd_opt(2024, 9, 7).unwrap()
        );
    }

    #[test]
    fn bad_attachment_id_skips_only_that_attachment() {
        let row = concat!(
            r#"<tr class="row-result">"#,
            r#"<td><div class="download-file" id_doc="3"></div></td>"#,
            "<td><span>Con allegati</span>",
            "Categoria: <span>Circolari</span>",
            "Pubblicato il: <span>01/03/2024</span>",
            "Valido fino al: <span>31/03/2024</span>",
            r#"<a class="link-to-file" id_doc="abc">rotto.pdf</a>"#,
            r#"<a class="link-to-file" id_doc="77">buono.pdf</a>"#,
            "</td></tr>"
        );
        let circulars = extract_circulars(&wrap(row)).unwrap();
        assert_eq!(circulars.len(), 1);
        assert_eq!(circulars[0].attachments.len(), 1);
        assert_eq!(circulars[0].attachments[0].id, 77);
        assert_eq!(circulars[0].attachments[0].title, "buono.pdf");
    }

    #[test]
    fn labeled_value_matches_by_substring() {
        let spans = vec![
            LabeledSpan {
                context: String::new(),
                value: "Titolo".to_string(),
            },
            LabeledSpan {
                context: " Categoria: ".to_string(),
                value: "Circolari docenti".to_string(),
            },
            LabeledSpan {
                context: " Pubblicato il: ".to_string(),
                value: "07/09/2024".to_string(),
            },
        ];
        assert_eq!(labeled_value(&spans, "Categoria"), Some("Circolari docenti"));
        assert_eq!(labeled_value(&spans, "Pubblicato il"), Some("07/09/2024"));
        assert_eq!(labeled_value(&spans, "Valido fino"), None);
    }

    #[test]
    fn labeled_value_first_match_wins() {
        let spans = vec![
            LabeledSpan {
                context: "Categoria: ".to_string(),
                value: "prima".to_string(),
            },
            LabeledSpan {
                context: "Categoria: ".to_string(),
                value: "seconda".to_string(),
            },
        ];
        assert_eq!(labeled_value(&spans, "Categoria"), Some("prima"));
    }

    #[test]
    fn labeled_value_on_empty_sequence() {
        assert_eq!(labeled_value(&[], "Categoria"), None);
    }
}
