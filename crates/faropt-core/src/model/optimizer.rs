use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::bounds::Bounds;
use super::gp::{GaussianProcess, expected_improvement};
use crate::error::FarOptError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Acquisition {
    ExpectedImprovement { xi: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcquisitionOptimizer {
    /// Evaluate the acquisition on uniformly sampled candidates and keep the best.
    Sampling { n_points: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialDesign {
    LatinHypercube,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub n_initial_points: usize,
    pub acquisition: Acquisition,
    pub acquisition_optimizer: AcquisitionOptimizer,
    pub initial_design: InitialDesign,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            n_initial_points: 10,
            acquisition: Acquisition::ExpectedImprovement { xi: 0.01 },
            acquisition_optimizer: AcquisitionOptimizer::Sampling { n_points: 10_000 },
            initial_design: InitialDesign::LatinHypercube,
        }
    }
}

/// A told point and its objective value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub x: Vec<f64>,
    pub f: f64,
}

/// Ask/tell Bayesian optimizer minimising a black-box objective.
///
/// All randomness derives from `seed` and the number of observations, so the state fully
/// determines what [`Optimizer::ask`] returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optimizer {
    bounds: Bounds,
    settings: OptimizerSettings,
    seed: u64,
    initial_points: Vec<Vec<f64>>,
    observations: Vec<Observation>,
}

impl Optimizer {
    pub fn new(bounds: Bounds, settings: OptimizerSettings, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let initial_points = match settings.initial_design {
            InitialDesign::LatinHypercube => {
                latin_hypercube(&bounds, settings.n_initial_points, &mut rng)
            }
        };
        Self {
            bounds,
            settings,
            seed,
            initial_points,
            observations: vec![],
        }
    }

    /// Default settings with a random seed.
    pub fn with_bounds(bounds: Bounds) -> Self {
        Self::new(bounds, OptimizerSettings::default(), rand::random())
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Next point to evaluate. Does not change the optimizer.
    pub fn ask(&self) -> Vec<f64> {
        let n = self.observations.len();
        if let Some(point) = self.initial_points.get(n) {
            return point.clone();
        }

        let step_seed = self.seed ^ (n as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(step_seed);
        let x: Vec<Vec<f64>> = self
            .observations
            .iter()
            .map(|o| self.bounds.to_unit(&o.x))
            .collect();
        let y: Vec<f64> = self.observations.iter().map(|o| o.f).collect();
        let dims = self.bounds.len();

        let Some(gp) = GaussianProcess::fit(&x, &y) else {
            log::debug!("Surrogate fit failed, asking a random point");
            let u: Vec<f64> = (0..dims).map(|_| rng.r#gen::<f64>()).collect();
            return self.bounds.from_unit(&u);
        };

        let best = y.iter().copied().fold(f64::INFINITY, f64::min);
        let Acquisition::ExpectedImprovement { xi } = self.settings.acquisition;
        let AcquisitionOptimizer::Sampling { n_points } = self.settings.acquisition_optimizer;

        let mut winner = (f64::NEG_INFINITY, vec![0.5; dims]);
        for _ in 0..n_points.max(1) {
            let candidate: Vec<f64> = (0..dims).map(|_| rng.r#gen::<f64>()).collect();
            let (mean, std) = gp.predict(&candidate);
            let ei = expected_improvement(mean, std, best, xi);
            if ei > winner.0 {
                winner = (ei, candidate);
            }
        }
        self.bounds.from_unit(&winner.1)
    }

    /// Record `f(x)` and return the best observation so far.
    pub fn tell(&mut self, x: Vec<f64>, f: f64) -> Result<&Observation, FarOptError> {
        if x.len() != self.bounds.len() {
            return Err(FarOptError::InvalidObservation(format!(
                "expected {} coordinates, got {}",
                self.bounds.len(),
                x.len()
            )));
        }
        if !self.bounds.contains(&x) {
            return Err(FarOptError::InvalidObservation(format!(
                "{x:?} is outside of the bounds"
            )));
        }
        if !f.is_finite() {
            return Err(FarOptError::InvalidObservation(format!(
                "objective value {f} is not finite"
            )));
        }

        self.observations.push(Observation { x, f });
        self.best().ok_or_else(|| {
            FarOptError::InvalidObservation("no observation recorded".to_string())
        })
    }

    pub fn best(&self) -> Option<&Observation> {
        self.observations
            .iter()
            .min_by(|a, b| a.f.total_cmp(&b.f))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FarOptError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FarOptError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// One point per stratum in every dimension, strata paired at random.
fn latin_hypercube(bounds: &Bounds, n: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut points = vec![Vec::with_capacity(bounds.len()); n];
    for dim in bounds.dims() {
        let mut strata: Vec<usize> = (0..n).collect();
        strata.shuffle(rng);
        for (point, stratum) in points.iter_mut().zip(strata) {
            let u = (stratum as f64 + rng.r#gen::<f64>()) / n as f64;
            point.push(dim.from_unit(u));
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds::try_from(vec![(-2.0, 2.0), (0.0, 5.0)]).unwrap()
    }

    fn quadratic(x: &[f64]) -> f64 {
        (x[0] - 0.5).powi(2) + (x[1] - 1.0).powi(2)
    }

    fn fast_settings() -> OptimizerSettings {
        OptimizerSettings {
            acquisition_optimizer: AcquisitionOptimizer::Sampling { n_points: 500 },
            ..Default::default()
        }
    }

    #[test]
    fn initial_design_is_latin() {
        let opt = Optimizer::new(bounds(), OptimizerSettings::default(), 7);
        let n = opt.settings().n_initial_points;

        for (d, dim) in bounds().dims().iter().enumerate() {
            let mut strata: Vec<usize> = opt
                .initial_points
                .iter()
                .map(|p| {
                    assert!(dim.contains(p[d]));
                    ((dim.to_unit(p[d]) * n as f64) as usize).min(n - 1)
                })
                .collect();
            strata.sort_unstable();
            assert_eq!(strata, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn ask_is_pure() {
        let mut opt = Optimizer::new(bounds(), fast_settings(), 11);
        assert_eq!(opt.ask(), opt.ask());

        for _ in 0..12 {
            let x = opt.ask();
            let f = quadratic(&x);
            opt.tell(x, f).unwrap();
        }
        let first = opt.ask();
        assert_eq!(first, opt.ask());
        assert!(opt.bounds().contains(&first));
    }

    #[test]
    fn ask_walks_through_initial_points() {
        let mut opt = Optimizer::new(bounds(), fast_settings(), 3);
        let first = opt.ask();
        opt.tell(first.clone(), 1.0).unwrap();
        assert_ne!(opt.ask(), first);
    }

    #[test]
    fn tell_tracks_the_best_observation() {
        let mut opt = Optimizer::new(bounds(), fast_settings(), 5);
        opt.tell(vec![0.0, 0.0], 3.0).unwrap();
        let best = opt.tell(vec![0.5, 1.0], -1.0).unwrap().clone();
        opt.tell(vec![1.0, 2.0], 0.0).unwrap();

        assert_eq!(best.f, -1.0);
        assert_eq!(opt.best().unwrap().x, vec![0.5, 1.0]);
        assert_eq!(opt.observations().len(), 3);
    }

    #[test]
    fn tell_rejects_invalid_observations() {
        let mut opt = Optimizer::new(bounds(), fast_settings(), 5);
        assert!(opt.tell(vec![0.0], 1.0).is_err());
        assert!(opt.tell(vec![3.0, 1.0], 1.0).is_err());
        assert!(opt.tell(vec![0.0, 1.0], f64::NAN).is_err());
        assert!(opt.observations().is_empty());
    }

    #[test]
    fn optimization_improves_on_initial_design() {
        let mut opt = Optimizer::new(bounds(), fast_settings(), 42);
        for _ in 0..10 {
            let x = opt.ask();
            let f = quadratic(&x);
            opt.tell(x, f).unwrap();
        }
        let initial_best = opt.best().unwrap().f;
        for _ in 0..15 {
            let x = opt.ask();
            let f = quadratic(&x);
            opt.tell(x, f).unwrap();
        }
        assert!(opt.best().unwrap().f <= initial_best);
        assert!(opt.best().unwrap().f < 0.5);
    }

    #[test]
    fn state_survives_serialization() {
        let mut opt = Optimizer::new(bounds(), fast_settings(), 9);
        for _ in 0..11 {
            let x = opt.ask();
            let f = quadratic(&x);
            opt.tell(x, f).unwrap();
        }
        let restored = Optimizer::from_bytes(&opt.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, opt);
        assert_eq!(restored.ask(), opt.ask());
    }

    #[test]
    fn garbage_blob_is_an_encoding_error() {
        assert!(matches!(
            Optimizer::from_bytes(b"\xc1\xc1"),
            Err(FarOptError::ModelEncoding(_))
        ));
    }
}
