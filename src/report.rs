//! Human-readable and serializable summaries of a derivation.

use colored::*;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::Style,
};

use crate::graph::Graph;
use crate::rewriting::grammar::{Derivation, DerivationState};
use crate::rewriting::matching;

/// One row of the step table.
#[derive(Clone, Debug, Tabled)]
pub struct StepRow {
    #[tabled(rename = "Step")]
    pub step: usize,
    #[tabled(rename = "Production")]
    pub production: String,
    #[tabled(rename = "Matches")]
    pub candidates: usize,
    #[tabled(rename = "Match")]
    pub matched: String,
    #[tabled(rename = "Vertices")]
    pub vertices: usize,
    #[tabled(rename = "Edges")]
    pub edges: usize,
}

pub fn step_rows(derivation: &Derivation) -> Vec<StepRow> {
    derivation
        .steps
        .iter()
        .zip(&derivation.graphs)
        .enumerate()
        .map(|(i, (step, graph))| StepRow {
            step: i + 1,
            production: step.production.clone(),
            candidates: step.candidates,
            matched: matching::describe(step.matched.embedding()),
            vertices: graph.vertex_count(),
            edges: graph.edge_count(),
        })
        .collect()
}

/// Step table of a derivation, empty if no step was taken.
pub fn format_steps(derivation: &Derivation) -> String {
    let rows = step_rows(derivation);
    if rows.is_empty() {
        return String::new();
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

pub fn format_state(state: DerivationState) -> ColoredString {
    let text = state.to_string();
    match state {
        DerivationState::Running => text.yellow(),
        DerivationState::HaltedNoMatch => text.green().bold(),
        DerivationState::HaltedStepLimit => text.cyan().bold(),
    }
}

#[derive(Serialize)]
pub struct StepOutput<'a> {
    pub production: &'a str,
    pub candidates: usize,
    pub graph: &'a Graph,
}

/// What the `derive` binary writes out.
#[derive(Serialize)]
pub struct DerivationOutput<'a> {
    pub state: DerivationState,
    pub seed: &'a Graph,
    pub steps: Vec<StepOutput<'a>>,
}

impl<'a> DerivationOutput<'a> {
    pub fn new(seed: &'a Graph, derivation: &'a Derivation) -> Self {
        Self {
            state: derivation.state,
            seed,
            steps: derivation
                .steps
                .iter()
                .zip(&derivation.graphs)
                .map(|(step, graph)| StepOutput {
                    production: &step.production,
                    candidates: step.candidates,
                    graph,
                })
                .collect(),
        }
    }
}
