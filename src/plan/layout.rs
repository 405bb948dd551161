use serde::Serialize;

use crate::plan::types::{AspectRatio, PlanRecord};

/// Ratios in the order the prompt asks for them.
pub fn expected_layout(portrait: u32, landscape: u32, first: AspectRatio) -> Vec<AspectRatio> {
    let count = |ratio: AspectRatio| match ratio {
        AspectRatio::Portrait => portrait,
        AspectRatio::Landscape => landscape,
    };
    let second = first.other();
    let mut layout = Vec::with_capacity((portrait + landscape) as usize);
    layout.extend(std::iter::repeat(first).take(count(first) as usize));
    layout.extend(std::iter::repeat(second).take(count(second) as usize));
    layout
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutReport {
    pub requested: usize,
    pub returned: usize,
    pub portrait_requested: usize,
    pub portrait_returned: usize,
    pub landscape_requested: usize,
    pub landscape_returned: usize,
    /// False when a record of the leading orientation follows one of the
    /// trailing orientation.
    pub grouped: bool,
}

impl LayoutReport {
    pub fn is_conformant(&self) -> bool {
        self.grouped
            && self.portrait_requested == self.portrait_returned
            && self.landscape_requested == self.landscape_returned
    }

    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.returned < self.requested {
            issues.push(format!(
                "count shortfall: requested {} plan(s), received {}",
                self.requested, self.returned
            ));
        } else if self.returned > self.requested {
            issues.push(format!(
                "count surplus: requested {} plan(s), received {}",
                self.requested, self.returned
            ));
        }
        if self.portrait_requested != self.portrait_returned
            || self.landscape_requested != self.landscape_returned
        {
            issues.push(format!(
                "orientation mix differs: requested {}x9:16 + {}x16:9, received {}x9:16 + {}x16:9",
                self.portrait_requested,
                self.landscape_requested,
                self.portrait_returned,
                self.landscape_returned
            ));
        }
        if !self.grouped {
            issues.push("orientations are interleaved instead of grouped".to_string());
        }
        issues
    }
}

/// Compares returned records against the requested layout. Never reorders.
pub fn check_layout(
    expected: &[AspectRatio],
    records: &[PlanRecord],
    first: AspectRatio,
) -> LayoutReport {
    let tally = |ratios: &mut dyn Iterator<Item = AspectRatio>| {
        ratios.fold((0usize, 0usize), |(portrait, landscape), ratio| match ratio {
            AspectRatio::Portrait => (portrait + 1, landscape),
            AspectRatio::Landscape => (portrait, landscape + 1),
        })
    };
    let (portrait_requested, landscape_requested) = tally(&mut expected.iter().copied());
    let (portrait_returned, landscape_returned) =
        tally(&mut records.iter().map(|record| record.target_aspect_ratio));

    let mut seen_second = false;
    let mut grouped = true;
    for record in records {
        if record.target_aspect_ratio == first {
            if seen_second {
                grouped = false;
                break;
            }
        } else {
            seen_second = true;
        }
    }

    LayoutReport {
        requested: expected.len(),
        returned: records.len(),
        portrait_requested,
        portrait_returned,
        landscape_requested,
        landscape_returned,
        grouped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::records::tests::sample_record;

    fn records(ratios: &[AspectRatio]) -> Vec<PlanRecord> {
        ratios
            .iter()
            .enumerate()
            .map(|(index, ratio)| {
                let mut record = sample_record(&format!("plan {index}"));
                record.target_aspect_ratio = *ratio;
                record
            })
            .collect()
    }

    #[test]
    fn portrait_first_layout_lists_portraits_then_landscapes() {
        let layout = expected_layout(2, 1, AspectRatio::Portrait);
        assert_eq!(
            layout,
            vec![
                AspectRatio::Portrait,
                AspectRatio::Portrait,
                AspectRatio::Landscape
            ]
        );
    }

    #[test]
    fn landscape_first_layout_flips_groups() {
        let layout = expected_layout(1, 2, AspectRatio::Landscape);
        assert_eq!(
            layout,
            vec![
                AspectRatio::Landscape,
                AspectRatio::Landscape,
                AspectRatio::Portrait
            ]
        );
    }

    #[test]
    fn conforming_response_has_no_issues() {
        let expected = expected_layout(2, 1, AspectRatio::Portrait);
        let report = check_layout(&expected, &records(&expected), AspectRatio::Portrait);
        assert!(report.is_conformant());
        assert!(report.issues().is_empty());
    }

    #[test]
    fn detects_interleaved_orientations() {
        let expected = expected_layout(2, 1, AspectRatio::Portrait);
        let returned = records(&[
            AspectRatio::Portrait,
            AspectRatio::Landscape,
            AspectRatio::Portrait,
        ]);
        let report = check_layout(&expected, &returned, AspectRatio::Portrait);
        assert!(!report.grouped);
        assert!(!report.is_conformant());
        assert_eq!(report.issues().len(), 1);
    }

    #[test]
    fn reports_shortfall_and_mix() {
        let expected = expected_layout(2, 2, AspectRatio::Portrait);
        let returned = records(&[AspectRatio::Portrait, AspectRatio::Portrait, AspectRatio::Portrait]);
        let report = check_layout(&expected, &returned, AspectRatio::Portrait);
        assert_eq!(report.returned, 3);
        let issues = report.issues();
        assert!(issues.iter().any(|issue| issue.contains("shortfall")));
        assert!(issues.iter().any(|issue| issue.contains("orientation mix")));
    }
}
