//! Experience report extraction
//!
//! A report page has three regions the extractor cares about: the narrative
//! between the `Start Body` / `End Body` comments, the dose chart table and the
//! `footdata` footer holding metadata, substances and tags.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, warn};

use super::config::ExperienceSelectors;
use super::tag_list::{TagListParse, TagListParser};
use super::{
    ExtractContext, ParsingError, ParsingResult, RecordExtractor, compile_selector, element_text,
    first_text,
};
use crate::domain::{BODY_WEIGHT_KEY, Experience, SubstanceUsage};

pub struct ExperienceExtractor {
    report_body: Selector,
    dose_chart: Selector,
    table_row: Selector,
    table_cell: Selector,
    link: Selector,
    dose_time: Selector,
    dose_amount: Selector,
    dose_method: Selector,
    dose_substance: Selector,
    dose_form: Selector,
    title: Selector,
    body_weight: Selector,
    footdata: Selector,
    body_start_marker: String,
    body_end_marker: String,
    dose_time_label: String,
    dose_cell_class_prefix: String,
    pdf_link_text: String,
    tag_list: TagListParser,
}

impl ExperienceExtractor {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&ExperienceSelectors::default())
    }

    pub fn with_config(selectors: &ExperienceSelectors) -> ParsingResult<Self> {
        Ok(Self {
            report_body: compile_selector(&selectors.report_body)?,
            dose_chart: compile_selector(&selectors.dose_chart)?,
            table_row: compile_selector(&selectors.table_row)?,
            table_cell: compile_selector(&selectors.table_cell)?,
            link: compile_selector(&selectors.link)?,
            dose_time: compile_selector(&selectors.dose_time)?,
            dose_amount: compile_selector(&selectors.dose_amount)?,
            dose_method: compile_selector(&selectors.dose_method)?,
            dose_substance: compile_selector(&selectors.dose_substance)?,
            dose_form: compile_selector(&selectors.dose_form)?,
            title: compile_selector(&selectors.title)?,
            body_weight: compile_selector(&selectors.body_weight)?,
            footdata: compile_selector(&selectors.footdata)?,
            body_start_marker: selectors.body_start_marker.clone(),
            body_end_marker: selectors.body_end_marker.clone(),
            dose_time_label: selectors.dose_time_label.clone(),
            dose_cell_class_prefix: selectors.dose_cell_class_prefix.clone(),
            pdf_link_text: selectors.pdf_link_text.clone(),
            tag_list: TagListParser::new()?,
        })
    }

    /// Text nodes between the body markers, in document order.
    fn extract_narrative(&self, html: &Html, context: &ExtractContext) -> ParsingResult<Vec<String>> {
        let container = html
            .select(&self.report_body)
            .next()
            .ok_or_else(|| ParsingError::missing_record_body(&context.url))?;

        let mut inside = false;
        let mut saw_start = false;
        let mut paragraphs = Vec::new();

        for child in container.children() {
            match child.value() {
                Node::Comment(comment) => {
                    let marker = comment.trim();
                    if marker == self.body_start_marker {
                        inside = true;
                        saw_start = true;
                    } else if marker == self.body_end_marker {
                        break;
                    }
                }
                Node::Text(text) if inside => {
                    let text = text.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                }
                _ => {}
            }
        }

        if !saw_start {
            return Err(ParsingError::missing_record_body(&context.url));
        }
        if paragraphs.is_empty() {
            warn!("⚠️  Story is empty for experience {}", context.record_id());
        }
        Ok(paragraphs)
    }

    fn extract_usages(&self, html: &Html) -> Vec<SubstanceUsage> {
        let Some(chart) = html.select(&self.dose_chart).next() else {
            return Vec::new();
        };
        chart
            .select(&self.table_row)
            .map(|row| self.extract_usage(row))
            .collect()
    }

    fn extract_usage(&self, row: ElementRef<'_>) -> SubstanceUsage {
        let substance = row.select(&self.dose_substance).next();
        let substance_id = substance
            .and_then(|cell| cell.select(&self.link).next())
            .and_then(|link| link.value().attr("href"))
            .map(|href| href.trim().to_string())
            .unwrap_or_default();
        let substance_name = substance.map(element_text).unwrap_or_default();

        SubstanceUsage {
            use_time: self.extract_use_time(row),
            amount: first_text(row, &self.dose_amount),
            method: first_text(row, &self.dose_method),
            substance_id,
            substance_name,
            form: first_text(row, &self.dose_form),
        }
    }

    /// The time cell is either classed or the first unclassed cell of the row.
    fn extract_use_time(&self, row: ElementRef<'_>) -> String {
        let cell = row.select(&self.dose_time).next().or_else(|| {
            row.select(&self.table_cell).find(|cell| {
                !cell
                    .value()
                    .classes()
                    .any(|class| class.starts_with(&self.dose_cell_class_prefix))
            })
        });
        cell.map(|cell| {
            cell.text()
                .collect::<String>()
                .replace(&self.dose_time_label, "")
                .trim()
                .to_string()
        })
        .unwrap_or_default()
    }

    fn footdata_rows<'a>(&self, footdata: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let rows: Vec<_> = footdata.select(&self.table_row).collect();
        if rows.is_empty() {
            footdata.children().filter_map(ElementRef::wrap).collect()
        } else {
            rows
        }
    }

    fn extract_footdata(
        &self,
        html: &Html,
        context: &ExtractContext,
        metadata: &mut BTreeMap<String, String>,
    ) -> (TagListParse, TagListParse) {
        let mut substances = TagListParse::default();
        let mut tags = TagListParse::default();

        let Some(footdata) = html.select(&self.footdata).next() else {
            warn!("⚠️  No footer data for experience {}", context.record_id());
            return (substances, tags);
        };

        for row in self.footdata_rows(footdata) {
            let cells: Vec<ElementRef<'_>> = row.children().filter_map(ElementRef::wrap).collect();
            if cells.len() > 1 {
                for cell in cells {
                    if let Some((key, value)) = split_metadata_pair(&element_text(cell)) {
                        metadata.insert(key, value);
                    }
                }
                continue;
            }

            let text = element_text(row);
            if text.is_empty() || text.contains(&self.pdf_link_text) {
                continue;
            }
            let mut segments = text.split(':');
            if let Some(segment) = segments.next() {
                substances.merge(self.tag_list.parse(segment));
            }
            match segments.next() {
                Some(segment) => tags.merge(self.tag_list.parse(segment)),
                None => warn!("⚠️  Tag row without a tag segment on {}", context.url),
            }
        }

        if !substances.skipped.is_empty() || !tags.skipped.is_empty() {
            debug!(
                "Skipped {} substance and {} tag fragments on {}",
                substances.skipped_count(),
                tags.skipped_count(),
                context.url
            );
        }
        (substances, tags)
    }
}

/// `key: value` with exactly one colon; anything else is dropped.
fn split_metadata_pair(text: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = text.split(':').collect();
    match parts.as_slice() {
        [key, value] if !key.trim().is_empty() => {
            Some((key.trim().to_string(), value.trim().to_string()))
        }
        _ => None,
    }
}

impl RecordExtractor for ExperienceExtractor {
    type Output = Experience;

    fn extract(&self, html: &Html, context: &ExtractContext) -> ParsingResult<Experience> {
        debug!("Extracting experience {} from {}", context.record_id(), context.url);

        let narrative = self.extract_narrative(html, context)?;
        let substance_usages = self.extract_usages(html);

        let title = html
            .select(&self.title)
            .next()
            .map(element_text)
            .ok_or_else(|| ParsingError::missing_title(&context.url))?;

        let mut metadata = BTreeMap::new();
        let body_weight = html
            .select(&self.body_weight)
            .next()
            .map(element_text)
            .unwrap_or_default();
        metadata.insert(BODY_WEIGHT_KEY.to_string(), body_weight);

        let (substances, tags) = self.extract_footdata(html, context, &mut metadata);

        Ok(Experience {
            id: context.record_id().to_string(),
            title,
            narrative,
            substance_usages,
            substances_simple: substances.entries,
            metadata,
            tags: tags.entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NamedRef;

    const REPORT_PAGE: &str = r#"
        <html><body>
        <div class="title">A Night Out</div>
        <table class="dosechart">
          <tr>
            <td>DOSE:</td>
            <td class="dosechart-amount">2 bowls</td>
            <td class="dosechart-method">smoked</td>
            <td class="dosechart-substance"><a href="/chemicals/cannabis/">Cannabis</a></td>
            <td class="dosechart-form">(plant material)</td>
          </tr>
          <tr>
            <td class="dosechart-time">T+ 1:30</td>
            <td class="dosechart-amount">1 glass</td>
            <td class="dosechart-substance">Alcohol</td>
          </tr>
        </table>
        <table class="bodyweight"><tr><td class="bodyweight-amount">70 kg</td></tr></table>
        <div class="report-text-surround"><!-- Start Body -->
        First paragraph.
        <br>
        Second paragraph.
        <!-- End Body -->
        After the end.
        </div>
        <table class="footdata">
          <tr><td>Exp Year: 2005</td><td>ExpID: 1234</td></tr>
          <tr><td>Gender: Male</td><td>Time: 10:30</td></tr>
          <tr><td colspan="2">[ <a href="exp.php?ID=1234&format=pdf">View as PDF</a> ]</td></tr>
          <tr><td colspan="2">Cannabis (1), Alcohol (24) : General, Small Group (5), Party (23)</td></tr>
        </table>
        </body></html>
    "#;

    fn extract(page: &str) -> ParsingResult<Experience> {
        let extractor = ExperienceExtractor::new().unwrap();
        let html = Html::parse_document(page);
        let context = ExtractContext::new("https://www.erowid.org/experiences/exp.php?ID=1234")
            .with_record_id("1234");
        extractor.extract(&html, &context)
    }

    #[test]
    fn test_full_report_page() {
        let experience = extract(REPORT_PAGE).unwrap();

        assert_eq!(experience.id, "1234");
        assert_eq!(experience.title, "A Night Out");
        assert_eq!(experience.narrative, vec!["First paragraph.", "Second paragraph."]);
        assert_eq!(experience.body_weight(), "70 kg");

        assert_eq!(experience.substance_usages.len(), 2);
        let first = &experience.substance_usages[0];
        assert_eq!(first.use_time, "");
        assert_eq!(first.amount, "2 bowls");
        assert_eq!(first.method, "smoked");
        assert_eq!(first.substance_id, "/chemicals/cannabis/");
        assert_eq!(first.substance_name, "Cannabis");
        assert_eq!(first.form, "(plant material)");
        let second = &experience.substance_usages[1];
        assert_eq!(second.use_time, "T+ 1:30");
        assert_eq!(second.method, "");
        assert_eq!(second.substance_id, "");
        assert_eq!(second.substance_name, "Alcohol");

        assert_eq!(
            experience.substances_simple,
            vec![NamedRef::new("Cannabis", "1"), NamedRef::new("Alcohol", "24")]
        );
        assert_eq!(
            experience.tags,
            vec![NamedRef::new("Small Group", "5"), NamedRef::new("Party", "23")]
        );

        assert_eq!(experience.metadata.get("Exp Year").map(String::as_str), Some("2005"));
        assert_eq!(experience.metadata.get("ExpID").map(String::as_str), Some("1234"));
        assert_eq!(experience.metadata.get("Gender").map(String::as_str), Some("Male"));
        // two colons is ambiguous
        assert!(!experience.metadata.contains_key("Time"));
    }

    #[test]
    fn test_missing_body_container() {
        let page = r#"<div class="title">t</div><p>no report here</p>"#;
        let err = extract(page).unwrap_err();
        assert_eq!(err.kind(), "MissingRecordBody");
    }

    #[test]
    fn test_container_without_start_marker() {
        let page = r#"<div class="title">t</div><div class="report-text-surround">text</div>"#;
        let err = extract(page).unwrap_err();
        assert_eq!(err.kind(), "MissingRecordBody");
    }

    #[test]
    fn test_narrative_without_end_marker_runs_to_container_end() {
        let page = r#"<div class="title">t</div>
            <div class="report-text-surround">before<!-- Start Body -->one<br>two</div>
            <p>outside</p>"#;
        let experience = extract(page).unwrap();
        assert_eq!(experience.narrative, vec!["one", "two"]);
    }

    #[test]
    fn test_missing_title() {
        let page = r#"<div class="report-text-surround"><!-- Start Body -->text<!-- End Body --></div>"#;
        let err = extract(page).unwrap_err();
        assert_eq!(err, ParsingError::missing_title("https://www.erowid.org/experiences/exp.php?ID=1234"));
    }

    #[test]
    fn test_sparse_page_is_not_fatal() {
        let page = r#"
            <div class="title">Quiet</div>
            <div class="report-text-surround"><!-- Start Body --><!-- End Body --></div>
        "#;
        let experience = extract(page).unwrap();
        assert!(experience.narrative.is_empty());
        assert!(experience.substance_usages.is_empty());
        assert!(experience.tags.is_empty());
        assert_eq!(experience.body_weight(), "");
        assert_eq!(experience.metadata.len(), 1);
    }

    #[test]
    fn test_split_metadata_pair() {
        assert_eq!(
            split_metadata_pair(" Gender : Female "),
            Some(("Gender".to_string(), "Female".to_string()))
        );
        assert_eq!(split_metadata_pair("no colon"), None);
        assert_eq!(split_metadata_pair("a:b:c"), None);
        assert_eq!(split_metadata_pair(": orphan"), None);
    }
}
