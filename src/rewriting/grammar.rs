use std::fmt;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::Graph;

use super::matching::{BacktrackingMatcher, Matcher};
use super::production::{Match, Production};
use super::random;

#[derive(Clone, Debug, Default)]
pub struct DerivationConfig {
    /// Number of rewrites after which the derivation stops; `0` means unbounded.
    pub max_steps: usize,
    /// Search budget per production and step. A production whose search runs
    /// out of time is treated as having no match in that step.
    pub match_time_limit: Option<Duration>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivationState {
    Running,
    HaltedNoMatch,
    HaltedStepLimit,
}

impl fmt::Display for DerivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationState::Running => write!(f, "running"),
            DerivationState::HaltedNoMatch => write!(f, "no production matches"),
            DerivationState::HaltedStepLimit => write!(f, "step limit reached"),
        }
    }
}

/// One rewrite of a derivation.
#[derive(Clone, Debug)]
pub struct StepRecord {
    pub production: String,
    pub matched: Match,
    /// Number of matches the chosen production had in this step.
    pub candidates: usize,
}

/// The graphs produced by a derivation, excluding the seed graph.
#[derive(Clone, Debug)]
pub struct Derivation {
    pub graphs: Vec<Graph>,
    pub steps: Vec<StepRecord>,
    pub state: DerivationState,
}

impl Derivation {
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn last(&self) -> Option<&Graph> {
        self.graphs.last()
    }
}

/// A set of productions applied repeatedly to a host graph.
///
/// Each step visits the productions in a fresh random order, takes the first one
/// with any match and applies it at a uniformly chosen match. All random choices
/// come from the grammar's own generator, so a grammar built
/// [`with_seed`](Grammar::with_seed) derives the same sequence every time.
pub struct Grammar {
    productions: Vec<Production>,
    rng: StdRng,
    matcher: Box<dyn Matcher>,
    config: DerivationConfig,
}

impl Grammar {
    pub fn new(productions: Vec<Production>) -> Self {
        Self {
            productions,
            rng: StdRng::from_entropy(),
            matcher: Box::new(BacktrackingMatcher),
            config: DerivationConfig::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    /// Sets the configuration used by [`apply`](Grammar::apply).
    pub fn with_config(mut self, config: DerivationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    /// Derives from `seed` for at most `max_steps` rewrites (`0` for no bound).
    pub fn apply(&mut self, seed: &Graph, max_steps: usize) -> Result<Derivation> {
        let config = DerivationConfig {
            max_steps,
            ..self.config.clone()
        };
        self.derive(seed, &config)
    }

    /// Runs a derivation from `seed` until no production matches or the step
    /// limit of `config` is reached.
    ///
    /// A failing rewrite aborts the derivation with [`Error::DerivationFailed`].
    pub fn derive(&mut self, seed: &Graph, config: &DerivationConfig) -> Result<Derivation> {
        let mut graphs: Vec<Graph> = Vec::new();
        let mut steps = Vec::new();
        let mut state = DerivationState::Running;

        while state == DerivationState::Running {
            let current = graphs.last().unwrap_or(seed);

            let Some((index, mut matches)) = self.applicable(current, config) else {
                state = DerivationState::HaltedNoMatch;
                break;
            };
            let Some(choice) = random::select(&mut self.rng, matches.len()) else {
                state = DerivationState::HaltedNoMatch;
                break;
            };
            let candidates = matches.len();
            let matched = matches.swap_remove(choice);

            let production = &self.productions[index];
            let step = graphs.len() + 1;
            let next = production
                .apply(current, &matched)
                .map_err(|source| Error::DerivationFailed {
                    step,
                    production: production.name().to_string(),
                    source: Box::new(source),
                })?;

            debug!(
                step,
                production = production.name(),
                candidates,
                vertices = next.vertex_count(),
                edges = next.edge_count(),
                "derivation step"
            );

            graphs.push(next);
            steps.push(StepRecord {
                production: production.name().to_string(),
                matched,
                candidates,
            });

            if config.max_steps > 0 && graphs.len() >= config.max_steps {
                state = DerivationState::HaltedStepLimit;
            }
        }

        debug!(steps = graphs.len(), %state, "derivation finished");
        Ok(Derivation {
            graphs,
            steps,
            state,
        })
    }

    // First production with any match, visiting productions in random order.
    fn applicable(
        &mut self,
        host: &Graph,
        config: &DerivationConfig,
    ) -> Option<(usize, Vec<Match>)> {
        for index in random::randomly(&mut self.rng, self.productions.len()) {
            let production = &self.productions[index];
            let matches = match config.match_time_limit {
                Some(limit) => {
                    match production.find_matches_within(host, self.matcher.as_ref(), limit) {
                        Some(matches) => matches,
                        None => {
                            warn!(
                                production = production.name(),
                                ?limit,
                                "match search timed out, treating production as inapplicable"
                            );
                            continue;
                        }
                    }
                }
                None => production.find_matches_with(host, self.matcher.as_ref()),
            };
            if !matches.is_empty() {
                return Some((index, matches));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{DerivationConfig, DerivationState, Grammar};
    use crate::attrs;
    use crate::error::Error;
    use crate::graph::{DanglingPolicy, Graph, Value};
    use crate::rewriting::correspondence::Correspondence;
    use crate::rewriting::matching::ParallelMatcher;
    use crate::rewriting::production::Production;

    fn recolor() -> Production {
        let mut lhs = Graph::new();
        let red = lhs.add_vertex(attrs! { "color" => "red" });
        let mut rhs = Graph::new();
        let blue = rhs.add_vertex(attrs! { "color" => "blue" });
        Production::builder("recolor", lhs, rhs)
            .preserve_vertex(red, blue)
            .build()
            .unwrap()
    }

    // Matches forever: the empty pattern occurs once in every graph.
    fn spawn() -> Production {
        let mut rhs = Graph::new();
        rhs.add_vertex(attrs! { "spawned" => true });
        Production::new("spawn", Graph::new(), rhs, Correspondence::new()).unwrap()
    }

    // Hangs a new leaf of the given kind off any vertex.
    fn grow(kind: &str) -> Production {
        let mut lhs = Graph::new();
        let parent = lhs.add_vertex(attrs! {});
        let mut rhs = Graph::new();
        let kept = rhs.add_vertex(attrs! {});
        let leaf = rhs.add_vertex(attrs! { "kind" => kind });
        rhs.add_edge(kept, leaf, attrs! {}).unwrap();
        Production::builder(format!("grow-{kind}"), lhs, rhs)
            .preserve_vertex(parent, kept)
            .build()
            .unwrap()
    }

    fn seed() -> Graph {
        let mut graph = Graph::new();
        graph.add_vertex(attrs! { "color" => "red" });
        graph
    }

    #[test]
    fn recolor_halts_when_nothing_is_red() {
        let mut grammar = Grammar::new(vec![recolor()]).with_seed(1);
        let seed = seed();
        let derivation = grammar.apply(&seed, 0).unwrap();

        assert_eq!(derivation.len(), 1);
        assert_eq!(derivation.state, DerivationState::HaltedNoMatch);
        let vertex = derivation.last().unwrap().vertices().next().unwrap();
        assert_eq!(vertex.attribute("color"), Some(&Value::from("blue")));
        assert_eq!(seed.vertices().next().unwrap().attribute("color"), Some(&Value::from("red")));
    }

    #[test]
    fn step_limit_yields_exactly_that_many_graphs() {
        let mut grammar = Grammar::new(vec![spawn()]).with_seed(5);
        let derivation = grammar.apply(&Graph::new(), 3).unwrap();

        assert_eq!(derivation.len(), 3);
        assert_eq!(derivation.state, DerivationState::HaltedStepLimit);
        let sizes: Vec<usize> = derivation.graphs.iter().map(Graph::vertex_count).collect();
        assert_eq!(sizes, vec![1, 2, 3]);
        assert!(derivation.steps.iter().all(|step| step.production == "spawn"));
    }

    #[test]
    fn empty_grammar_derives_nothing() {
        let mut grammar = Grammar::new(Vec::new()).with_seed(0);
        let derivation = grammar.apply(&seed(), 10).unwrap();
        assert!(derivation.is_empty());
        assert_eq!(derivation.state, DerivationState::HaltedNoMatch);
    }

    #[test]
    fn fixed_seed_reproduces_derivation() {
        let run = |seed: u64| {
            let mut grammar = Grammar::new(vec![grow("a"), grow("b")]).with_seed(seed);
            let mut start = Graph::new();
            start.add_vertex(attrs! { "kind" => "root" });
            grammar.apply(&start, 12).unwrap()
        };

        let first = run(99);
        let second = run(99);
        assert_eq!(first.graphs, second.graphs);
        let names = |d: &super::Derivation| {
            d.steps.iter().map(|s| s.production.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(&first), names(&second));
        assert_eq!(first.last().unwrap().vertex_count(), 13);
    }

    #[test]
    fn parallel_matcher_derives_the_same_graphs() {
        let start = seed();
        let sequential = Grammar::new(vec![grow("a"), grow("b")])
            .with_seed(7)
            .apply(&start, 8)
            .unwrap();
        let parallel = Grammar::new(vec![grow("a"), grow("b")])
            .with_seed(7)
            .with_matcher(ParallelMatcher)
            .apply(&start, 8)
            .unwrap();
        assert_eq!(sequential.graphs, parallel.graphs);
    }

    #[test]
    fn apply_keeps_configured_time_limit() {
        let config = DerivationConfig {
            max_steps: 0,
            match_time_limit: Some(Duration::ZERO),
        };
        let mut grammar = Grammar::new(vec![grow("a")]).with_seed(3).with_config(config);
        let derivation = grammar.apply(&seed(), 4).unwrap();
        assert!(derivation.is_empty());
        assert_eq!(derivation.state, DerivationState::HaltedNoMatch);

        let mut unlimited = Grammar::new(vec![grow("a")])
            .with_seed(3)
            .with_config(DerivationConfig::default());
        assert_eq!(unlimited.apply(&seed(), 4).unwrap().len(), 4);
    }

    #[test]
    fn timed_out_search_counts_as_no_match() {
        let config = DerivationConfig {
            max_steps: 5,
            match_time_limit: Some(Duration::ZERO),
        };
        let mut grammar = Grammar::new(vec![grow("a")]).with_seed(3);
        let derivation = grammar.derive(&seed(), &config).unwrap();
        assert!(derivation.is_empty());
        assert_eq!(derivation.state, DerivationState::HaltedNoMatch);
    }

    #[test]
    fn failing_rewrite_aborts_derivation() {
        let mut lhs = Graph::new();
        lhs.add_vertex(attrs! { "doomed" => true });
        let delete = Production::builder("delete", lhs, Graph::new())
            .dangling_policy(DanglingPolicy::Reject)
            .build()
            .unwrap();

        let mut host = Graph::new();
        let doomed = host.add_vertex(attrs! { "doomed" => true });
        let other = host.add_vertex(attrs! {});
        host.add_edge(doomed, other, attrs! {}).unwrap();

        let mut grammar = Grammar::new(vec![delete]).with_seed(0);
        match grammar.apply(&host, 0) {
            Err(Error::DerivationFailed {
                step,
                production,
                source,
            }) => {
                assert_eq!(step, 1);
                assert_eq!(production, "delete");
                assert!(matches!(*source, Error::DanglingEdgePolicyViolation { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
