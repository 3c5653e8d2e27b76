pub mod classification;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod decay;
pub mod error;
pub mod estimator;
pub mod fixture;
pub mod generators;
pub mod likelihood;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod results;

pub use classification::{Classifier, PlayedMatch, StandardClassifier};
pub use codec::{CodecVariant, StrengthMap};
pub use config::ForecastConfig;
pub use error::{ForecastError, Result};
pub use fixture::{Fixture, Outcome, Score};
pub use models::ModelKind;
pub use orchestrator::{Forecaster, ModelRun};
pub use results::{ForecastResults, RoundReport, SimulationTally};
