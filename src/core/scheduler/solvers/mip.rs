//! Binary integer programs and the backends solving them.

use std::time::{Duration, Instant};

use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolutionStatus, SolverModel, Variable, WithTimeLimit,
};
use log::debug;

/// `Σ coefficient·x[variable] = rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearEquality {
    pub terms: Vec<(usize, f64)>,
    pub rhs: f64,
}

/// Minimisation over binary variables `x[0..num_variables]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryProgram {
    pub num_variables: usize,
    pub objective: Vec<f64>,
    pub equalities: Vec<LinearEquality>,
    /// Variables pinned to zero.
    pub fixed_zero: Vec<usize>,
}

impl BinaryProgram {
    pub fn new(objective: Vec<f64>) -> Self {
        Self {
            num_variables: objective.len(),
            objective,
            ..Default::default()
        }
    }

    pub fn add_equality(&mut self, terms: Vec<(usize, f64)>, rhs: f64) {
        self.equalities.push(LinearEquality { terms, rhs });
    }

    pub fn fix_zero(&mut self, variable: usize) {
        self.fixed_zero.push(variable);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MipStatus {
    /// Value of every variable in the optimal solution.
    Optimal(Vec<bool>),
    Infeasible,
    TimedOut,
    Failed(String),
}

pub trait MipBackend: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, program: &BinaryProgram, timeout: Duration) -> MipStatus;
}

/// Pure Rust branch-and-bound backend from `good_lp`.
///
/// The deadline is handed to microlp, which stops its simplex and branching loops
/// once it passes. A stopped search is reported as `TimedOut`, even with an incumbent.
#[derive(Default, Debug)]
pub struct MicroLpBackend;

impl MipBackend for MicroLpBackend {
    fn name(&self) -> &str {
        "microlp"
    }

    fn solve(&self, program: &BinaryProgram, timeout: Duration) -> MipStatus {
        let started = Instant::now();
        let mut vars = ProblemVariables::new();
        let xs: Vec<Variable> = (0..program.num_variables)
            .map(|_| vars.add(variable().binary()))
            .collect();

        let objective: Expression = program
            .objective
            .iter()
            .zip(&xs)
            .map(|(&coefficient, &x)| coefficient * x)
            .sum();
        let mut model = vars.minimise(objective).using(microlp);
        for equality in &program.equalities {
            let lhs: Expression = equality
                .terms
                .iter()
                .map(|&(idx, coefficient)| coefficient * xs[idx])
                .sum();
            model = model.with(constraint!(lhs == equality.rhs));
        }
        for &idx in &program.fixed_zero {
            model = model.with(constraint!(xs[idx] == 0.0));
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        let result = model.with_time_limit(remaining.as_secs_f64()).solve();
        let elapsed = started.elapsed();
        debug!(
            "{} solved {} variables in {:?}",
            self.name(),
            program.num_variables,
            elapsed
        );
        match result {
            Ok(solution) => match solution.status() {
                SolutionStatus::Optimal => {
                    MipStatus::Optimal(xs.iter().map(|&x| solution.value(x) > 0.5).collect())
                }
                SolutionStatus::TimeLimit | SolutionStatus::GapLimit => MipStatus::TimedOut,
            },
            Err(ResolutionError::Infeasible) => MipStatus::Infeasible,
            // interrupted before any feasible point was found
            Err(_) if elapsed >= timeout => MipStatus::TimedOut,
            Err(err) => MipStatus::Failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_cheapest_of_exactly_one() {
        let mut program = BinaryProgram::new(vec![3.0, 1.0, 2.0]);
        program.add_equality(vec![(0, 1.0), (1, 1.0), (2, 1.0)], 1.0);
        let status = MicroLpBackend.solve(&program, Duration::from_secs(20));
        assert_eq!(status, MipStatus::Optimal(vec![false, true, false]));

        program.fix_zero(1);
        let status = MicroLpBackend.solve(&program, Duration::from_secs(20));
        assert_eq!(status, MipStatus::Optimal(vec![false, false, true]));
    }

    #[test]
    fn test_infeasible_program() {
        let mut program = BinaryProgram::new(vec![1.0, 1.0]);
        program.add_equality(vec![(0, 1.0), (1, 1.0)], 3.0);
        let status = MicroLpBackend.solve(&program, Duration::from_secs(20));
        assert_eq!(status, MipStatus::Infeasible);
    }

    // assignment-like program: every row picks exactly one column, every column
    // takes `rows / cols` rows
    fn assignment_program(rows: usize, cols: usize) -> BinaryProgram {
        let objective = (0..rows * cols)
            .map(|idx| ((idx * 7919) % 101) as f64 + (idx % cols) as f64 * 0.5)
            .collect();
        let mut program = BinaryProgram::new(objective);
        for row in 0..rows {
            program.add_equality((0..cols).map(|col| (row * cols + col, 1.0)).collect(), 1.0);
        }
        for col in 0..cols {
            let terms = (0..rows).map(|row| (row * cols + col, 1.0)).collect();
            program.add_equality(terms, (rows / cols) as f64);
        }
        program
    }

    #[test]
    fn test_expired_deadline_is_timed_out() {
        let status = MicroLpBackend.solve(&assignment_program(12, 4), Duration::ZERO);
        assert_eq!(status, MipStatus::TimedOut);
    }

    #[test]
    fn test_deadline_bounds_the_solve() {
        let program = assignment_program(120, 60);
        let started = Instant::now();
        let status = MicroLpBackend.solve(&program, Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert!(matches!(status, MipStatus::TimedOut | MipStatus::Optimal(_)));
    }
}
