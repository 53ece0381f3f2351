use std::time::Instant;

use rayon::prelude::*;
use tracing::trace;

use crate::graph::Graph;

use super::backtracking::{SearchPlan, SearchState};
use super::{Matcher, Pattern, SearchOutcome};

/// Backtracking search with the first level of the search tree spread over the
/// rayon thread pool.
///
/// Branches only share the read-only pattern and host graph. Results are
/// concatenated in candidate order, so the outcome is identical to that of
/// [`BacktrackingMatcher`](super::BacktrackingMatcher).
pub struct ParallelMatcher;

impl Matcher for ParallelMatcher {
    fn find(&self, pattern: &Pattern, host: &Graph, deadline: Option<Instant>) -> SearchOutcome {
        let plan = SearchPlan::new(pattern, host);
        let Some(root) = plan.steps.first() else {
            return SearchState::new(&plan, pattern, host, deadline).run();
        };

        let branches: Vec<SearchOutcome> = root
            .candidates
            .par_iter()
            .map(|&candidate| SearchState::new(&plan, pattern, host, deadline).run_from(candidate))
            .collect();

        let outcome = SearchOutcome::merge(branches);
        trace!(
            branches = root.candidates.len(),
            embeddings = outcome.embeddings.len(),
            complete = outcome.complete,
            "parallel search finished"
        );
        outcome
    }
}
