//! Time integration loop.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{LbmError, Result};
use crate::field::{ScalarField, VectorField};
use crate::kernels::LatticeBackend;
use crate::params::FlowParams;
use crate::state::LatticeState;

/// Lifecycle of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Fields allocated, populations not yet at equilibrium.
    Init,
    /// Populations initialised; iterations remain.
    Stepping,
    /// `max_iter` iterations completed.
    Done,
}

/// Density and velocity at a given iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroscopicSnapshot {
    /// Completed iterations when the snapshot was taken.
    pub iteration: usize,
    /// Density.
    pub rho: ScalarField,
    /// Velocity.
    pub u: VectorField,
}

impl MacroscopicSnapshot {
    /// `|u|` per site, laid out as `(nx, ny)`.
    pub fn velocity_magnitude(&self) -> Vec<f64> {
        self.u.magnitude()
    }

    /// Largest `|u|`.
    pub fn max_velocity(&self) -> f64 {
        self.velocity_magnitude().into_iter().fold(0.0, f64::max)
    }

    /// Average density.
    pub fn mean_density(&self) -> f64 {
        self.rho.mean()
    }

    /// Whether every density and velocity value is finite.
    pub fn is_finite(&self) -> bool {
        self.rho.as_slice().iter().all(|v| v.is_finite())
            && self.u.as_slice().iter().all(|v| v.is_finite())
    }

    /// Fail with [`LbmError::NonFinite`] unless [`is_finite`](Self::is_finite).
    pub fn ensure_finite(&self) -> Result<()> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(LbmError::NonFinite {
                iteration: self.iteration,
            })
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Iterations executed by this call.
    pub iterations: usize,
    /// Wall-clock time.
    pub elapsed: Duration,
    /// Million lattice-site updates per second.
    pub mlups: f64,
}

/// Drives a backend through `max_iter` time steps.
pub struct Simulation<B: LatticeBackend> {
    backend: B,
    params: FlowParams,
    state: B::State,
    phase: Phase,
    iteration: usize,
}

impl<B: LatticeBackend> Simulation<B> {
    /// Allocate the fields for `params` and upload them to `backend`.
    pub fn new(backend: B, params: FlowParams) -> Result<Self> {
        let host = LatticeState::new(&params)?;
        for warning in params.stability_warnings() {
            tracing::warn!(backend = backend.name(), "{warning}");
        }
        let state = backend.upload(&host)?;
        tracing::info!(
            backend = backend.name(),
            nx = params.nx,
            ny = params.ny,
            omega = params.omega(),
            obstacle_sites = host.obstacle.count(),
            "simulation allocated"
        );

        Ok(Self {
            backend,
            params,
            state,
            phase: Phase::Init,
            iteration: 0,
        })
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completed iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Run parameters.
    pub fn params(&self) -> &FlowParams {
        &self.params
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Set `fin` to the equilibrium of the initial density and velocity.
    pub fn initialize(&mut self) -> Result<()> {
        if self.phase != Phase::Init {
            return Err(LbmError::config("simulation already initialized"));
        }
        self.backend.initialize(&mut self.state)?;
        self.phase = if self.params.max_iter == 0 {
            Phase::Done
        } else {
            Phase::Stepping
        };
        Ok(())
    }

    /// Run one time step, initialising first if needed.
    ///
    /// Returns `false` once `max_iter` iterations have been completed.
    pub fn step(&mut self) -> Result<bool> {
        if self.phase == Phase::Init {
            self.initialize()?;
        }
        if self.phase == Phase::Done {
            return Ok(false);
        }

        self.backend.step(&mut self.state)?;
        self.iteration += 1;
        if self.iteration >= self.params.max_iter {
            self.phase = Phase::Done;
        }
        Ok(true)
    }

    /// Run the remaining iterations.
    pub fn run(&mut self) -> Result<RunStats> {
        self.run_with_observer(0, |_| Ok(()))
    }

    /// Run the remaining iterations, handing a snapshot to `observer` every
    /// `every` iterations (never when `every` is zero).
    pub fn run_with_observer<F>(&mut self, every: usize, mut observer: F) -> Result<RunStats>
    where
        F: FnMut(&MacroscopicSnapshot) -> Result<()>,
    {
        let start = Instant::now();
        let first = self.iteration;
        tracing::info!(
            backend = self.backend.name(),
            from = first,
            to = self.params.max_iter,
            "starting run"
        );

        while self.step()? {
            if every > 0 && self.iteration % every == 0 {
                let snapshot = self.snapshot()?;
                tracing::debug!(
                    iteration = snapshot.iteration,
                    max_velocity = snapshot.max_velocity(),
                    mean_density = snapshot.mean_density(),
                    "snapshot"
                );
                observer(&snapshot)?;
            }
        }
        self.backend.synchronize()?;

        let elapsed = start.elapsed();
        let iterations = self.iteration - first;
        let updates = (iterations * self.params.sites()) as f64;
        let secs = elapsed.as_secs_f64();
        let stats = RunStats {
            iterations,
            elapsed,
            mlups: if secs > 0.0 { updates / secs / 1e6 } else { 0.0 },
        };
        tracing::info!(
            backend = self.backend.name(),
            iterations,
            elapsed_ms = elapsed.as_millis() as u64,
            mlups = stats.mlups,
            "run finished"
        );
        Ok(stats)
    }

    /// Density and velocity at the current iteration.
    pub fn snapshot(&self) -> Result<MacroscopicSnapshot> {
        let (rho, u) = self.backend.read_macroscopic(&self.state)?;
        Ok(MacroscopicSnapshot {
            iteration: self.iteration,
            rho,
            u,
        })
    }

    /// Copy every field back into a host state.
    pub fn download(&self) -> Result<LatticeState> {
        let mut host = LatticeState::new(&self.params)?;
        self.backend.download(&self.state, &mut host)?;
        Ok(host)
    }
}
