//! StreetLight Core - civic issue report intake
//!
//! This crate decides, for one uploaded photo and a submitted GPS fix,
//! whether a civic issue report is accepted, what it shows, how severe it
//! is and how much to trust it. With the `python` feature it is exposed to
//! the web layer via PyO3. The implementation prioritizes:
//!
//! 1. **Security** - Untrusted images and EXIF are bounded and sanitized
//! 2. **Logging** - Every decision point logged with report context
//! 3. **Graceful degradation** - External lookups never fail a report
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `pipeline` - Two-stage orchestrator producing a `Decision`
//! - `validation` - Stage 0 image quality gate
//! - `classification` - Stage 1 classifier, severity and scoring
//! - `location` - Photo GPS vs submitted GPS verification
//! - `extraction` - EXIF GPS and camera metadata
//! - `security` - EXIF text sanitization
//! - `routing` - Accept/reject decision
//! - `storage` - Report row projection and SQL builders
//! - `geo` - Coordinates and distances
//! - `config` - Agent configuration
//! - `logging` - Structured logging with report context

pub mod classification;
pub mod config;
pub mod error;
pub mod extraction;
pub mod geo;
pub mod location;
pub mod logging;
pub mod pipeline;
pub mod routing;
pub mod security;
pub mod storage;
pub mod validation;

pub use config::AgentConfig;
pub use error::{CoreError, Result};
pub use pipeline::{Decision, LayerOrchestrator};

#[cfg(feature = "python")]
mod python {
    use std::path::PathBuf;

    use lazy_static::lazy_static;
    use parking_lot::RwLock;
    use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    use crate::config::AgentConfig;
    use crate::error::CoreError;
    use crate::logging::structured::init_logger;
    use crate::pipeline::LayerOrchestrator;

    lazy_static! {
        /// Loaded once by `init_agent`; read-only afterwards.
        static ref AGENT: RwLock<Option<LayerOrchestrator>> = RwLock::new(None);
    }

    fn to_py_err(err: CoreError) -> PyErr {
        match err {
            CoreError::Io(e) => PyIOError::new_err(e.to_string()),
            CoreError::Config(msg) => PyValueError::new_err(msg),
            other => PyRuntimeError::new_err(other.to_string()),
        }
    }

    fn with_agent<T>(f: impl FnOnce(&LayerOrchestrator) -> PyResult<T>) -> PyResult<T> {
        let guard = AGENT.read();
        let agent = guard
            .as_ref()
            .ok_or_else(|| PyRuntimeError::new_err("agent not initialised; call init_agent()"))?;
        f(agent)
    }

    /// Load the model and lookup clients.
    ///
    /// # Arguments
    /// * `config_json` - Optional JSON config; environment variables
    ///   (`STREETLIGHT_*`) are used when absent
    #[pyfunction]
    #[pyo3(signature = (config_json=None))]
    fn init_agent(py: Python<'_>, config_json: Option<String>) -> PyResult<()> {
        init_logger();

        let config = match config_json {
            Some(json) => AgentConfig::from_json(&json),
            None => AgentConfig::from_env(),
        }
        .map_err(to_py_err)?;

        let agent = py
            .allow_threads(|| LayerOrchestrator::from_config(config))
            .map_err(|e| {
                log::error!("AGENT_INIT_FAILED error=\"{}\"", e);
                to_py_err(e)
            })?;

        *AGENT.write() = Some(agent);
        log::info!("AGENT_INITIALISED");
        Ok(())
    }

    /// Run one report through both stages.
    ///
    /// # Returns
    /// The decision as a JSON string.
    #[pyfunction]
    #[pyo3(signature = (image_path, latitude=None, longitude=None))]
    fn process_report(
        py: Python<'_>,
        image_path: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> PyResult<String> {
        init_logger();
        let path = PathBuf::from(image_path);

        py.allow_threads(|| {
            with_agent(|agent| {
                let decision = agent
                    .process_report(&path, latitude, longitude)
                    .map_err(to_py_err)?;
                serde_json::to_string(&decision)
                    .map_err(|e| PyRuntimeError::new_err(e.to_string()))
            })
        })
    }

    #[pyfunction]
    fn get_health_status() -> PyResult<String> {
        with_agent(|agent| {
            serde_json::to_string(&agent.health_status())
                .map_err(|e| PyRuntimeError::new_err(e.to_string()))
        })
    }

    #[pyfunction]
    fn get_thresholds() -> PyResult<String> {
        with_agent(|agent| Ok(agent.thresholds().to_string()))
    }

    /// Python module definition
    #[pymodule]
    fn streetlight_core(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(init_agent, m)?)?;
        m.add_function(wrap_pyfunction!(process_report, m)?)?;
        m.add_function(wrap_pyfunction!(get_health_status, m)?)?;
        m.add_function(wrap_pyfunction!(get_thresholds, m)?)?;
        Ok(())
    }
}
