//! Sequential kinetics/equilibrium operator splitting.

use eq_core::timing::AccumulatingTimer;
use eq_solver::{EquilibriumResult, EquilibriumSolver, EquilibriumState, Partition};
use eq_thermo::ChemicalSystem;
use nalgebra::DVector;
use tracing::{debug, trace, warn};

use crate::error::{KineticError, KineticResult};
use crate::flow::{Sink, SinkTarget, Source};
use crate::integrator::{ForwardEuler, Integrator, RK4};
use crate::options::{IntegratorType, KineticOptions};
use crate::rates::KineticRates;

/// Record of a kinetic run.
#[derive(Clone, Debug, Default)]
pub struct KineticRecord {
    /// Time points (seconds)
    pub t: Vec<f64>,
    /// Species amount snapshots, one per time point
    pub n: Vec<DVector<f64>>,
    /// Equilibrium iterations of the solve that produced each snapshot
    pub equilibrium_iterations: Vec<usize>,
    /// Steps taken
    pub steps: usize,
}

impl KineticRecord {
    fn push(&mut self, t: f64, state: &EquilibriumState, iterations: usize) {
        self.t.push(t);
        self.n.push(state.species_amounts().clone());
        self.equilibrium_iterations.push(iterations);
    }
}

/// Advances kinetic species with an explicit integrator and re-equilibrates
/// the equilibrium species after every step.
///
/// Element totals are recorded at [`initialize`](Self::initialize) and only
/// change through sources and sinks. After a step the equilibrium budget is
/// whatever the kinetic and inert species do not hold.
pub struct KineticSolver<'a> {
    solver: EquilibriumSolver<'a>,
    options: KineticOptions,
    b_total: Option<DVector<f64>>,
    sources: Vec<Source>,
    sinks: Vec<Sink>,
    equilibrium_time: AccumulatingTimer,
}

impl<'a> KineticSolver<'a> {
    pub fn new(system: &'a ChemicalSystem, partition: Partition, options: KineticOptions) -> KineticResult<Self> {
        options.validate()?;
        Ok(Self {
            solver: EquilibriumSolver::with_partition(system, partition)?,
            options,
            b_total: None,
            sources: Vec::new(),
            sinks: Vec::new(),
            equilibrium_time: AccumulatingTimer::new(),
        })
    }

    /// Feed the composition of `source` at `volume_rate` [m³/s].
    ///
    /// The element inflow is `volume_rate · A·n / V` with `V` the total
    /// volume of `source` at its own temperature and pressure.
    pub fn add_source(&mut self, source: &EquilibriumState, volume_rate: f64) -> KineticResult<()> {
        let source = Source::from_state(self.solver.system(), source, volume_rate)?;
        debug!(volume_rate, inflow = ?source.elements.as_slice(), "added source");
        self.sources.push(source);
        Ok(())
    }

    /// Withdraw the named phase at `volume_rate` [m³/s].
    pub fn add_phase_sink(&mut self, phase: &str, volume_rate: f64) -> KineticResult<()> {
        let index = self.solver.system().index_phase(phase)?;
        self.sinks.push(Sink::new(SinkTarget::Phase(index), volume_rate)?);
        debug!(phase, volume_rate, "added phase sink");
        Ok(())
    }

    /// Withdraw all fluid (gas, solution and aqueous) phases together at
    /// `volume_rate` [m³/s].
    pub fn add_fluid_sink(&mut self, volume_rate: f64) -> KineticResult<()> {
        self.sinks.push(Sink::new(SinkTarget::Fluid, volume_rate)?);
        debug!(volume_rate, "added fluid sink");
        Ok(())
    }

    /// Withdraw all pure condensed phases together at `volume_rate` [m³/s].
    pub fn add_solid_sink(&mut self, volume_rate: f64) -> KineticResult<()> {
        self.sinks.push(Sink::new(SinkTarget::Solid, volume_rate)?);
        debug!(volume_rate, "added solid sink");
        Ok(())
    }

    pub fn options(&self) -> &KineticOptions {
        &self.options
    }

    pub fn partition(&self) -> &Partition {
        self.solver.partition()
    }

    /// Element totals recorded by [`initialize`](Self::initialize).
    pub fn element_totals(&self) -> Option<&DVector<f64>> {
        self.b_total.as_ref()
    }

    /// Wall-clock seconds spent in equilibrium solves so far.
    pub fn equilibrium_seconds(&self) -> f64 {
        self.equilibrium_time.total_seconds()
    }

    /// Record the element totals `A·n` of `state` as the conserved budget.
    pub fn initialize(&mut self, state: &EquilibriumState) -> KineticResult<()> {
        let system = self.solver.system();
        if state.num_species() != system.num_species() {
            return Err(KineticError::InvalidArg {
                what: "state was created for a different chemical system",
            });
        }
        self.b_total = Some(state.element_amounts(system));
        self.equilibrium_time.reset();
        Ok(())
    }

    /// Equilibrate the equilibrium species of `state` against the recorded
    /// totals without advancing time.
    pub fn equilibrate(&mut self, state: &mut EquilibriumState, time: f64) -> KineticResult<EquilibriumResult> {
        let be = self.equilibrium_budget(state)?;
        let t = state.temperature();
        let p = state.pressure();
        let solver = &self.solver;
        let options = &self.options.equilibrium;
        let result = self
            .equilibrium_time
            .measure(|| solver.solve(state, t, p, be.as_slice(), options))?;
        if !result.succeeded {
            return Err(KineticError::Equilibrium {
                time,
                message: result.failure_message().unwrap_or_default(),
            });
        }
        Ok(result)
    }

    /// Advance from `t` to `t + dt`.
    ///
    /// The kinetic species are integrated with the equilibrium amounts
    /// frozen at their values at `t`. Sources and sinks then update the
    /// element totals over `dt`, and the equilibrium species are re-solved
    /// warm from `state`.
    pub fn step<R: KineticRates + ?Sized>(
        &mut self,
        state: &mut EquilibriumState,
        rates: &mut R,
        t: f64,
        dt: f64,
    ) -> KineticResult<EquilibriumResult> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(KineticError::InvalidArg {
                what: "dt must be positive",
            });
        }
        if self.b_total.is_none() {
            return Err(KineticError::InvalidArg {
                what: "initialize must be called before step",
            });
        }

        let kinetic = self.solver.partition().indices_kinetic_species();
        if !kinetic.is_empty() {
            let amounts = self.integrate(state, &kinetic, rates, t, dt)?;
            for (&i, &amount) in kinetic.iter().zip(amounts.iter()) {
                state.set_species_amount(i, amount)?;
            }
        }
        self.exchange(state, dt)?;

        self.equilibrate(state, t + dt)
    }

    /// Run from `t0` to `t_end` in steps of `options.dt`, clipping the last
    /// step to land on `t_end`.
    ///
    /// Totals are recorded from `state` if [`initialize`](Self::initialize)
    /// was not called. The state is equilibrated at `t0` first.
    pub fn solve<R: KineticRates + ?Sized>(
        &mut self,
        state: &mut EquilibriumState,
        rates: &mut R,
        t0: f64,
        t_end: f64,
    ) -> KineticResult<KineticRecord> {
        if !t0.is_finite() || !t_end.is_finite() {
            return Err(KineticError::InvalidArg {
                what: "time bounds must be finite",
            });
        }
        if t_end < t0 {
            return Err(KineticError::InvalidArg {
                what: "t_end must not precede t0",
            });
        }
        if self.b_total.is_none() {
            self.initialize(state)?;
        }

        let dt = self.options.dt;
        let record_every = self.options.record_every;
        let max_steps = self.options.max_steps;
        // Avoid a sliver step from accumulated round-off
        let eps = 1e-12 * dt;

        let mut record = KineticRecord::default();
        let initial = self.equilibrate(state, t0)?;
        record.push(t0, state, initial.iterations);

        let mut t = t0;
        let mut last = initial.iterations;
        while t_end - t > eps && record.steps < max_steps {
            let h = dt.min(t_end - t);
            let result = self.step(state, rates, t, h)?;
            t += h;
            record.steps += 1;
            last = result.iterations;

            if record.steps % record_every == 0 {
                record.push(t, state, last);
            }
        }

        // Always record final state
        if record.steps % record_every != 0 {
            record.push(t, state, last);
        }

        if t_end - t > eps {
            warn!(t, t_end, max_steps, "kinetic run stopped at the step limit");
        }
        debug!(
            steps = record.steps,
            equilibrium_seconds = self.equilibrium_time.total_seconds(),
            "kinetic run finished"
        );
        Ok(record)
    }

    /// Apply sources and sinks over `dt`. Sinks remove the same fraction of
    /// every species in their phases, from `state` and from the totals.
    fn exchange(&mut self, state: &mut EquilibriumState, dt: f64) -> KineticResult<()> {
        if self.sources.is_empty() && self.sinks.is_empty() {
            return Ok(());
        }
        let system = self.solver.system();
        let b_total = self.b_total.as_mut().ok_or(KineticError::InvalidArg {
            what: "initialize must be called before step",
        })?;
        for source in &self.sources {
            *b_total += &source.elements * dt;
        }
        if self.sinks.is_empty() {
            return Ok(());
        }

        let volumes = system.phase_volumes(
            state.temperature().value,
            state.pressure().value,
            state.species_amounts().as_slice(),
        )?;
        let mut removed = vec![0.0; system.num_phases()];
        for sink in &self.sinks {
            for (total, f) in removed.iter_mut().zip(sink.fractions(system, &volumes, dt)) {
                *total = (*total + f).min(1.0);
            }
        }

        let a = system.formula_matrix();
        for (phase, &fraction) in system.phases().iter().zip(&removed) {
            if fraction <= 0.0 {
                continue;
            }
            for i in phase.species_range() {
                let amount = state.species_amount(i);
                *b_total -= a.column(i) * (fraction * amount);
                state.set_species_amount(i, amount * (1.0 - fraction))?;
            }
            trace!(phase = phase.name(), fraction, "phase withdrawn");
        }
        Ok(())
    }

    /// `be = (b_total − A_k·n_k − A_i·n_i)[active]`
    fn equilibrium_budget(&self, state: &EquilibriumState) -> KineticResult<DVector<f64>> {
        let b_total = self.b_total.as_ref().ok_or(KineticError::InvalidArg {
            what: "initialize must be called before equilibrating",
        })?;
        let system = self.solver.system();
        let partition = self.solver.partition();
        let a = system.formula_matrix();
        let n = state.species_amounts();

        let mut b = b_total.clone();
        for j in partition
            .indices_kinetic_species()
            .into_iter()
            .chain(partition.indices_inert_species())
        {
            b -= a.column(j) * n[j];
        }

        let active = partition.indices_equilibrium_elements(system);
        let scale = b_total.amax().max(1.0);
        Ok(DVector::from_iterator(
            active.len(),
            active.iter().map(|&e| {
                // Round-off when kinetic species hold the whole element
                if b[e] < 0.0 && b[e] > -1e-12 * scale { 0.0 } else { b[e] }
            }),
        ))
    }

    fn integrate<R: KineticRates + ?Sized>(
        &self,
        state: &EquilibriumState,
        kinetic: &[usize],
        rates: &mut R,
        t: f64,
        dt: f64,
    ) -> KineticResult<DVector<f64>> {
        let frozen = state.species_amounts().clone();
        let temperature = state.temperature().value;
        let pressure = state.pressure().value;
        let x0 = DVector::from_iterator(kinetic.len(), kinetic.iter().map(|&i| frozen[i]));

        let mut rhs = |time: f64, x: &DVector<f64>| -> KineticResult<DVector<f64>> {
            let mut n = frozen.clone();
            for (&i, &v) in kinetic.iter().zip(x.iter()) {
                n[i] = v;
            }
            let r = rates.rates(time, temperature, pressure, &n)?;
            if r.len() != kinetic.len() {
                return Err(KineticError::Rates {
                    message: format!("expected {} rates, got {}", kinetic.len(), r.len()),
                });
            }
            Ok(r)
        };

        let mut x = match self.options.integrator {
            IntegratorType::RK4 => RK4.step(&mut rhs, t, &x0, dt)?,
            IntegratorType::ForwardEuler => ForwardEuler.step(&mut rhs, t, &x0, dt)?,
        };

        let system = self.solver.system();
        for (slot, &i) in x.iter_mut().zip(kinetic) {
            if !slot.is_finite() {
                return Err(KineticError::Rates {
                    message: format!("non-finite amount for {} at t = {}", system.species()[i].name(), t + dt),
                });
            }
            if *slot < 0.0 {
                warn!(
                    species = system.species()[i].name(),
                    amount = *slot,
                    t = t + dt,
                    "clamping negative kinetic amount to zero"
                );
                *slot = 0.0;
            }
        }
        Ok(x)
    }
}

impl std::fmt::Debug for KineticSolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KineticSolver")
            .field("options", &self.options)
            .field("b_total", &self.b_total)
            .field("sources", &self.sources.len())
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}
