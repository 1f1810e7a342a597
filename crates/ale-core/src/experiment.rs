use crate::error::{AleError, Result};

/// One reported study: its identifier, subject count and the voxel-space
/// activation coordinates (foci) it reported.
#[derive(Clone, Debug, PartialEq)]
pub struct Experiment {
    pub article: String,
    pub subjects: u32,
    /// Voxel coordinates on the analysis grid, one per reported focus.
    pub foci: Vec<[usize; 3]>,
    /// Free-form labels used for experiment selection.
    pub tags: Vec<String>,
}

impl Experiment {
    pub fn new(
        article: impl Into<String>,
        subjects: u32,
        foci: Vec<[usize; 3]>,
    ) -> Result<Self> {
        let article = article.into();
        if subjects == 0 {
            return Err(AleError::InvalidSubjects(0));
        }
        if foci.is_empty() {
            return Err(AleError::InvalidExperiment {
                article,
                reason: "no foci".into(),
            });
        }
        Ok(Self {
            article,
            subjects,
            foci,
            tags: Vec::new(),
        })
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn focus_count(&self) -> usize {
        self.foci.len()
    }

    /// True when the experiment carries every requested tag. An empty
    /// request matches everything.
    pub fn matches_tags(&self, wanted: &[String]) -> bool {
        wanted.iter().all(|t| self.tags.iter().any(|have| have == t))
    }
}

/// Select the experiments matching a tag list, preserving order.
pub fn select_by_tags(experiments: &[Experiment], wanted: &[String]) -> Vec<Experiment> {
    experiments
        .iter()
        .filter(|e| e.matches_tags(wanted))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_subjects() {
        let err = Experiment::new("a", 0, vec![[1, 1, 1]]).unwrap_err();
        assert!(matches!(err, AleError::InvalidSubjects(0)));
    }

    #[test]
    fn rejects_empty_foci() {
        let err = Experiment::new("a", 10, vec![]).unwrap_err();
        assert!(matches!(err, AleError::InvalidExperiment { .. }));
    }

    #[test]
    fn tag_selection() {
        let exps = vec![
            Experiment::new("a", 10, vec![[1, 1, 1]])
                .unwrap()
                .with_tags(vec!["visual".into(), "adults".into()]),
            Experiment::new("b", 12, vec![[2, 2, 2]])
                .unwrap()
                .with_tags(vec!["visual".into()]),
        ];
        let both = select_by_tags(&exps, &["visual".into()]);
        assert_eq!(both.len(), 2);
        let one = select_by_tags(&exps, &["visual".into(), "adults".into()]);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].article, "a");
        let all = select_by_tags(&exps, &[]);
        assert_eq!(all.len(), 2);
    }
}
