//! Stage dependency graph.
//!
//! Edges point from a parent stage to the stages derived from it. For the
//! standard blueprint this is `base → development` and `base → production`,
//! which serializes the shared base before either leaf.

use std::collections::{BTreeMap, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::types::{StageDef, StageError, StageName};

pub struct StageGraph {
  graph: DiGraph<StageName, ()>,
  nodes: HashMap<StageName, NodeIndex>,
  deployable: HashMap<StageName, bool>,
}

impl StageGraph {
  /// Build the graph from a set of stage definitions.
  ///
  /// # Errors
  ///
  /// `MissingParent` if a stage derives from a stage not in the set, and
  /// `CycleDetected` if the parent relation loops.
  pub fn from_stages(stages: &BTreeMap<StageName, StageDef>) -> Result<Self, StageError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut deployable = HashMap::new();

    for (name, def) in stages {
      nodes.insert(*name, graph.add_node(*name));
      deployable.insert(*name, def.command().is_some());
    }

    for (name, def) in stages {
      if let Some(parent) = def.parent() {
        let Some(&parent_idx) = nodes.get(&parent) else {
          return Err(StageError::MissingParent { stage: *name, parent });
        };
        graph.add_edge(parent_idx, nodes[name], ());
      }
    }

    let dag = Self {
      graph,
      nodes,
      deployable,
    };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), StageError> {
    toposort(&self.graph, None).map_err(|_| StageError::CycleDetected)?;
    Ok(())
  }

  /// Stages from the root down to `target`, inclusive.
  pub fn lineage(&self, target: StageName) -> Result<Vec<StageName>, StageError> {
    let mut idx = *self.nodes.get(&target).ok_or(StageError::MissingStage(target))?;
    let mut chain = vec![target];

    while let Some(parent) = self.graph.neighbors_directed(idx, Direction::Incoming).next() {
      chain.push(self.graph[parent]);
      idx = parent;
    }

    chain.reverse();
    Ok(chain)
  }

  /// Like [`lineage`](Self::lineage), but only for stages with a start command.
  pub fn deployable_lineage(&self, target: StageName) -> Result<Vec<StageName>, StageError> {
    match self.deployable.get(&target) {
      None => Err(StageError::MissingStage(target)),
      Some(false) => Err(StageError::NotDeployable(target)),
      Some(true) => self.lineage(target),
    }
  }

  /// Stages grouped by depth. Every stage's parent is in an earlier wave.
  pub fn waves(&self) -> Result<Vec<Vec<StageName>>, StageError> {
    let order = toposort(&self.graph, None).map_err(|_| StageError::CycleDetected)?;
    let mut depth: HashMap<NodeIndex, usize> = HashMap::new();

    for idx in order {
      let level = self
        .graph
        .neighbors_directed(idx, Direction::Incoming)
        .filter_map(|p| depth.get(&p))
        .map(|d| d + 1)
        .max()
        .unwrap_or(0);
      depth.insert(idx, level);
    }

    let max_level = depth.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<StageName>> = vec![Vec::new(); max_level + 1];
    for (idx, level) in depth {
      waves[level].push(self.graph[idx]);
    }
    for wave in &mut waves {
      wave.sort();
    }
    waves.retain(|w| !w.is_empty());
    Ok(waves)
  }

  /// Stages derived directly from `stage`.
  pub fn children(&self, stage: StageName) -> Vec<StageName> {
    let Some(&idx) = self.nodes.get(&stage) else {
      return Vec::new();
    };
    let mut children: Vec<StageName> = self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|c| self.graph[c])
      .collect();
    children.sort();
    children
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::stage::types::{Instruction, StageSource};

  fn def(name: StageName, source: StageSource, cmd: bool) -> StageDef {
    let mut instructions = vec![Instruction::Workdir { path: "/app".to_string() }];
    if cmd {
      instructions.push(Instruction::Cmd {
        argv: vec!["uvicorn".to_string()],
      });
    }
    StageDef {
      name,
      source,
      instructions,
    }
  }

  fn standard() -> BTreeMap<StageName, StageDef> {
    [
      def(StageName::Base, StageSource::Image("python:3.11-slim".to_string()), false),
      def(StageName::Development, StageSource::Stage(StageName::Base), true),
      def(StageName::Production, StageSource::Stage(StageName::Base), true),
    ]
    .into_iter()
    .map(|d| (d.name, d))
    .collect()
  }

  #[test]
  fn leaves_descend_from_base() {
    let graph = StageGraph::from_stages(&standard()).unwrap();
    assert_eq!(
      graph.lineage(StageName::Production).unwrap(),
      vec![StageName::Base, StageName::Production]
    );
    assert_eq!(
      graph.children(StageName::Base),
      vec![StageName::Development, StageName::Production]
    );
  }

  #[test]
  fn base_is_not_deployable() {
    let graph = StageGraph::from_stages(&standard()).unwrap();
    assert_eq!(
      graph.deployable_lineage(StageName::Base),
      Err(StageError::NotDeployable(StageName::Base))
    );
    assert_eq!(graph.lineage(StageName::Base).unwrap(), vec![StageName::Base]);
  }

  #[test]
  fn waves_put_base_first() {
    let graph = StageGraph::from_stages(&standard()).unwrap();
    assert_eq!(
      graph.waves().unwrap(),
      vec![vec![StageName::Base], vec![StageName::Development, StageName::Production]]
    );
  }

  #[test]
  fn missing_parent_is_rejected() {
    let mut stages = standard();
    stages.remove(&StageName::Base);
    assert!(matches!(
      StageGraph::from_stages(&stages),
      Err(StageError::MissingParent {
        parent: StageName::Base,
        ..
      })
    ));
  }

  #[test]
  fn cycle_is_rejected() {
    let mut stages = standard();
    stages.insert(
      StageName::Base,
      def(StageName::Base, StageSource::Stage(StageName::Development), false),
    );
    assert!(matches!(StageGraph::from_stages(&stages), Err(StageError::CycleDetected)));
  }
}
