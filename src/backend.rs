//! MIP backend selection.
//!
//! Backends are compiled in through cargo features: `cbc` links COIN-OR CBC,
//! `microlp` (default) bundles a pure-Rust branch and bound solver. GLPK,
//! CPLEX and GUROBI can be requested but are never compiled in, so requests
//! for them fall back to CBC and then to the bundled solver.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::traits::MipBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SolverKind {
    Cbc,
    Glpk,
    Cplex,
    Gurobi,
    MicroLp,
}

impl SolverKind {
    pub const ALL: [SolverKind; 5] = [
        SolverKind::Cbc,
        SolverKind::Glpk,
        SolverKind::Cplex,
        SolverKind::Gurobi,
        SolverKind::MicroLp,
    ];

    pub fn is_available(self) -> bool {
        compiled(self).is_some()
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverKind::Cbc => "CBC",
            SolverKind::Glpk => "GLPK",
            SolverKind::Cplex => "CPLEX",
            SolverKind::Gurobi => "GUROBI",
            SolverKind::MicroLp => "MICROLP",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown solver '{0}'")]
pub struct UnknownSolver(pub String);

impl FromStr for SolverKind {
    type Err = UnknownSolver;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CBC" => Ok(SolverKind::Cbc),
            "GLPK" => Ok(SolverKind::Glpk),
            "CPLEX" => Ok(SolverKind::Cplex),
            "GUROBI" => Ok(SolverKind::Gurobi),
            "MICROLP" => Ok(SolverKind::MicroLp),
            _ => Err(UnknownSolver(s.to_string())),
        }
    }
}

/// No backend at all could be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no MIP backend available (requested {requested})")]
pub struct SolverUnavailableError {
    pub requested: SolverKind,
}

/// The requested backend, else CBC, else the bundled solver.
pub fn resolve(requested: SolverKind) -> Result<Box<dyn MipBackend>, SolverUnavailableError> {
    if let Some(backend) = compiled(requested) {
        return Ok(backend);
    }
    for fallback in [SolverKind::Cbc, SolverKind::MicroLp] {
        if let Some(backend) = compiled(fallback) {
            warn!(%requested, using = %fallback, "requested solver unavailable, falling back");
            return Ok(backend);
        }
    }
    Err(SolverUnavailableError { requested })
}

/// Backends compiled into this build.
pub fn available() -> Vec<SolverKind> {
    SolverKind::ALL
        .into_iter()
        .filter(|kind| kind.is_available())
        .collect()
}

fn compiled(kind: SolverKind) -> Option<Box<dyn MipBackend>> {
    match kind {
        #[cfg(feature = "cbc")]
        SolverKind::Cbc => Some(Box::new(cbc::CbcBackend)),
        #[cfg(feature = "microlp")]
        SolverKind::MicroLp => Some(Box::new(microlp::MicroLpBackend)),
        _ => None,
    }
}

#[cfg(feature = "microlp")]
pub mod microlp {
    use good_lp::{SolverModel, WithMipGap, WithTimeLimit};
    use tracing::warn;

    use super::SolverKind;
    use crate::mip::{self, CvrpInstance, MipOutcome, SolveLimits};
    use crate::models::MipStatus;
    use crate::traits::MipBackend;

    /// Pure-Rust branch and bound, stopped at the time limit or once the
    /// relative gap is closed.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MicroLpBackend;

    impl MipBackend for MicroLpBackend {
        fn kind(&self) -> SolverKind {
            SolverKind::MicroLp
        }

        fn solve(&self, instance: &CvrpInstance, limits: &SolveLimits) -> MipOutcome {
            let (model, x) = mip::formulate(instance, |vars, objective| {
                vars.minimise(objective)
                    .using(good_lp::microlp)
                    .with_time_limit(limits.time_limit.as_secs_f64())
            });
            let model = match model.with_mip_gap(limits.mip_gap as f32) {
                Ok(model) => model,
                Err(error) => {
                    warn!(mip_gap = limits.mip_gap, %error, "rejected mip gap");
                    return MipOutcome::failed(MipStatus::NotSolved);
                }
            };
            mip::read_outcome(model.solve(), &x, instance)
        }
    }
}

#[cfg(feature = "cbc")]
pub mod cbc {
    use good_lp::SolverModel;

    use super::SolverKind;
    use crate::mip::{self, CvrpInstance, MipOutcome, SolveLimits};
    use crate::traits::MipBackend;

    /// COIN-OR CBC with the configured time limit and relative gap.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct CbcBackend;

    impl MipBackend for CbcBackend {
        fn kind(&self) -> SolverKind {
            SolverKind::Cbc
        }

        fn solve(&self, instance: &CvrpInstance, limits: &SolveLimits) -> MipOutcome {
            let (mut model, x) = mip::formulate(instance, |vars, objective| {
                vars.minimise(objective).using(good_lp::coin_cbc)
            });
            model.set_parameter("seconds", &limits.time_limit.as_secs().to_string());
            model.set_parameter("ratioGap", &limits.mip_gap.to_string());
            model.set_parameter("log", "0");
            mip::read_outcome(model.solve(), &x, instance)
        }
    }
}
