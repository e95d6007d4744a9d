//! Multi-tick episode driving.
//!
//! The physical simulation ticks faster than agents decide: mid-cell
//! agents, malfunctioning agents and finished agents produce no fresh
//! observation. [`EpisodeDriver`] hides those silent ticks behind a single
//! `step` call, and [`Coordinator`] layers the conflict-detection,
//! coloring and resolution pipeline on top so callers submit no actions at
//! all.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::agent::AgentStatus;
use crate::coloring::Colorer;
use crate::config::CoreConfig;
use crate::conflict::ConflictGraphBuilder;
use crate::error::CoreError;
use crate::grid::{GridOracle, RailAction};
use crate::observation::legal_moves;
use crate::prediction::PredictionSnapshot;
use crate::resolver::{ActionResolver, Proposal};
use crate::{Features, Handle};

/// Per-agent bookkeeping reported alongside each observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentInfo {
    pub max_episode_steps: u32,
    pub num_agents: usize,
    pub agent_done: bool,
    /// Reward accumulated by this agent since the episode started.
    pub agent_score: f64,
    /// Physical ticks this agent has lived through.
    pub agent_step: u32,
}

/// Result of one driver step, covering every internal tick it spanned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    /// Fresh observations; finished agents receive their last one once.
    pub observations: BTreeMap<Handle, Features>,
    /// Rewards summed over the internal ticks of this step.
    pub rewards: BTreeMap<Handle, f64>,
    pub dones: BTreeMap<Handle, bool>,
    pub all_done: bool,
    pub infos: BTreeMap<Handle, AgentInfo>,
}

/// Drives a [`GridOracle`] episode, looping internal ticks until at least
/// one agent has a fresh observation or the episode ends.
///
/// Submitted actions apply to the first internal tick only; later ticks
/// run with an empty action map so the oracle keeps every agent's current
/// movement state. An agent that finishes is reported exactly once, with
/// its previous observation substituted if the final tick produced none.
pub struct EpisodeDriver<O: GridOracle> {
    oracle: O,
    episode_id: Uuid,
    agents_done: BTreeSet<Handle>,
    agent_scores: BTreeMap<Handle, f64>,
    agent_steps: BTreeMap<Handle, u32>,
    prev_obs: BTreeMap<Handle, Features>,
    finished: bool,
}

impl<O: GridOracle> EpisodeDriver<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            episode_id: Uuid::new_v4(),
            agents_done: BTreeSet::new(),
            agent_scores: BTreeMap::new(),
            agent_steps: BTreeMap::new(),
            prev_obs: BTreeMap::new(),
            finished: false,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Identifier of the running episode; changes on every reset.
    pub fn episode_id(&self) -> Uuid {
        self.episode_id
    }

    /// Starts a new episode and returns the initial observations.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<BTreeMap<Handle, Features>, CoreError> {
        self.episode_id = Uuid::new_v4();
        self.agents_done.clear();
        self.agent_scores.clear();
        self.agent_steps.clear();
        self.finished = false;

        let outcome = self.oracle.reset(seed)?;
        let observations: BTreeMap<Handle, Features> = outcome
            .observations
            .into_iter()
            .filter_map(|(handle, obs)| obs.map(|features| (handle, features)))
            .collect();
        self.prev_obs = observations.clone();
        tracing::info!(episode = %self.episode_id, agents = self.oracle.num_agents(), "episode reset");
        Ok(observations)
    }

    /// Advances the episode until fresh observations are available.
    ///
    /// # Errors
    ///
    /// [`CoreError::EpisodeFinished`] if called after the episode ended.
    pub fn step(
        &mut self,
        actions: BTreeMap<Handle, RailAction>,
    ) -> Result<StepOutput, CoreError> {
        if self.finished {
            return Err(CoreError::EpisodeFinished);
        }

        let mut actions = actions;
        let mut output = StepOutput::default();
        loop {
            let outcome = self.oracle.step(&actions)?;
            // Actions bind to the first tick only.
            actions = BTreeMap::new();

            for (&handle, &done) in &outcome.dones {
                if self.agents_done.contains(&handle) {
                    continue;
                }
                *self.agent_scores.entry(handle).or_insert(0.0) +=
                    outcome.rewards.get(&handle).copied().unwrap_or(0.0);
                *self.agent_steps.entry(handle).or_insert(0) += 1;
                *output.rewards.entry(handle).or_insert(0.0) +=
                    outcome.rewards.get(&handle).copied().unwrap_or(0.0);

                let fresh = outcome.observations.get(&handle).cloned().flatten();
                match fresh {
                    Some(features) => {
                        self.prev_obs.insert(handle, features.clone());
                        output.observations.insert(handle, features);
                        output.dones.insert(handle, done);
                    }
                    // A finished agent is reported one last time with its
                    // previous observation.
                    None if done => {
                        if let Some(features) = self.prev_obs.get(&handle) {
                            output.observations.insert(handle, features.clone());
                        }
                        output.dones.insert(handle, true);
                    }
                    None => {}
                }
                if done {
                    self.agents_done.insert(handle);
                }
            }

            if !output.observations.is_empty() || outcome.all_done {
                output.all_done = outcome.all_done;
                break;
            }
            tracing::debug!(episode = %self.episode_id, "no fresh observations; ticking again");
        }

        for (&handle, _) in &output.observations {
            output.infos.insert(
                handle,
                AgentInfo {
                    max_episode_steps: self.oracle.max_episode_steps(),
                    num_agents: self.oracle.num_agents(),
                    agent_done: output.dones.get(&handle).copied().unwrap_or(false),
                    agent_score: self.agent_scores.get(&handle).copied().unwrap_or(0.0),
                    agent_step: self.agent_steps.get(&handle).copied().unwrap_or(0),
                },
            );
        }
        self.finished = output.all_done;
        Ok(output)
    }
}

/// Closed-loop coordination: predicts trajectories, builds the conflict
/// graphs, colors priorities, proposes each agent's shortest-path move and
/// resolves the proposals, then drives the episode with the admitted
/// actions.
pub struct Coordinator<O: GridOracle> {
    driver: EpisodeDriver<O>,
    config: CoreConfig,
    colorer: Box<dyn Colorer>,
    resolver: ActionResolver,
}

impl<O: GridOracle> Coordinator<O> {
    pub fn new(oracle: O, config: CoreConfig) -> Self {
        let colorer = config.colorer();
        let resolver = config.resolver();
        Self {
            driver: EpisodeDriver::new(oracle),
            config,
            colorer,
            resolver,
        }
    }

    pub fn driver(&self) -> &EpisodeDriver<O> {
        &self.driver
    }

    pub fn reset(&mut self, seed: Option<u64>) -> Result<BTreeMap<Handle, Features>, CoreError> {
        self.resolver.reset();
        self.driver.reset(seed)
    }

    /// Runs one coordinated step.
    pub fn step(&mut self) -> Result<StepOutput, CoreError> {
        let oracle = &self.driver.oracle;
        let agents = oracle.agents();
        let handles: Vec<Handle> = agents.iter().map(|a| a.handle).collect();
        let horizon = self.config.prediction_horizon;

        let snapshot = PredictionSnapshot::capture(oracle, &handles, horizon);
        let graphs = ConflictGraphBuilder::build(oracle, &agents, &snapshot, horizon);
        let priorities = self.colorer.assign(
            &self.config.palette,
            &graphs.primary.handles(),
            &graphs.primary.adjacency(),
        );

        let mut proposals: BTreeMap<Handle, Proposal> = BTreeMap::new();
        for agent in &agents {
            match agent.status {
                AgentStatus::ReadyToDepart => {
                    // Departure occupies the initial cell, not a neighbor.
                    proposals.insert(
                        agent.handle,
                        Proposal::advance(RailAction::MoveForward, agent.initial_position),
                    );
                }
                AgentStatus::Active => {
                    let Some(best) = legal_moves(oracle, agent).into_iter().next() else {
                        continue;
                    };
                    let action = if best.exit == agent.heading.left() {
                        RailAction::MoveLeft
                    } else if best.exit == agent.heading.right() {
                        RailAction::MoveRight
                    } else {
                        RailAction::MoveForward
                    };
                    proposals.insert(agent.handle, Proposal::advance(action, best.next));
                }
                AgentStatus::NotStarted | AgentStatus::Done => {}
            }
        }

        let resolution = self.resolver.resolve(&proposals, &priorities, &agents);
        tracing::debug!(
            admitted = resolution.admitted.len(),
            waiting = resolution.waiting.len(),
            forced = resolution.forced.len(),
            "resolved tick"
        );
        self.driver.step(resolution.admitted)
    }
}
